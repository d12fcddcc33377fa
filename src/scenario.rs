//! Scenario orchestration: validation runs, baseline collection and the
//! regression report, plus the retry contract.
//!
//! Each validation attempt is a fully independent rebuild-and-rerun of the
//! workspace, because unseeded randomness in the simulation's
//! initialization can push any single run's statistics outside tolerance.
//! The first successful attempt wins; the scenario fails only once every
//! attempt has failed. Build and I/O errors abort the scenario immediately
//! (retrying a deterministic failure buys nothing); the workspace is torn
//! down on every exit path either way.

use std::collections::BTreeMap;
use std::path::PathBuf;

use colored::Colorize;

use crate::compare::StatisticalComparator;
use crate::error::{HarnessError, Result};
use crate::reader::{DatReader, FrameReader, ProbeKind};
use crate::render::{linspace, SummaryRenderer};
use crate::stats::{Moments, StatKind, ToleranceConfig};
use crate::types::{BaselineAccumulator, ComponentSet, RetryPolicy, ScenarioStatus};
use crate::template::TemplateEngine;
use crate::workspace::{BuildPlan, Workspace, WorkspaceConfig};

/// Timestamp at which the regression report samples field frames, seconds.
const REPORT_TIMESTAMP: f64 = 1e-8;

/// Composes workspace, reader, comparator and renderer into named scenarios.
pub struct TestOrchestrator<'a> {
    workspace_config: WorkspaceConfig,
    build_plan: BuildPlan,
    reference_dir: PathBuf,
    engine: &'a dyn TemplateEngine,
    renderer: &'a dyn SummaryRenderer,
    retry: RetryPolicy,
}

impl<'a> TestOrchestrator<'a> {
    /// Creates an orchestrator; all paths come in explicitly.
    #[must_use]
    pub fn new(
        workspace_config: WorkspaceConfig,
        build_plan: BuildPlan,
        reference_dir: PathBuf,
        engine: &'a dyn TemplateEngine,
        renderer: &'a dyn SummaryRenderer,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            workspace_config,
            build_plan,
            reference_dir,
            engine,
            renderer,
            retry,
        }
    }

    /// Validates every declared component at one frame, retrying the whole
    /// build-and-run up to the policy bound.
    pub fn validate(
        &self,
        components: &ComponentSet,
        frame: u32,
        tolerance: ToleranceConfig,
    ) -> Result<ScenarioStatus> {
        let max = self.retry.max_attempts();
        for attempt in 1..=max {
            println!("{}", format!("Launching tests. Try {attempt}").green());
            if self.validate_once(components, frame, tolerance)? {
                return Ok(ScenarioStatus::Passed);
            }
            if attempt != max {
                println!(
                    "{}",
                    format!("Oops... try {attempt} failed. Retrying due to random nature.")
                        .yellow()
                );
            }
        }
        Ok(ScenarioStatus::Failed)
    }

    /// One attempt: provision, run, compare all components. Tolerance
    /// mismatches accumulate without short-circuiting so the report covers
    /// every declared component.
    fn validate_once(
        &self,
        components: &ComponentSet,
        frame: u32,
        tolerance: ToleranceConfig,
    ) -> Result<bool> {
        let workspace = Workspace::provision(
            self.workspace_config.clone(),
            self.build_plan.clone(),
            self.engine,
        )?;
        workspace.run_simulation()?;

        let reader = DatReader::open(workspace.rendered_config())?;
        let comparator = StatisticalComparator::new(
            &reader,
            components,
            self.reference_dir.clone(),
            tolerance,
        )
        .verbose(self.workspace_config.verbose);

        let mut all_passed = true;
        for (component, _) in components.iter() {
            let result = comparator.compare(component, frame)?;
            if !result.passed {
                all_passed = false;
            }
        }
        Ok(all_passed)
    }

    /// Builds once, then launches the simulation `run_count` times,
    /// sampling every component's moments per run and averaging them into
    /// a new baseline mapping.
    pub fn collect_baseline(
        &self,
        components: &ComponentSet,
        frame: u32,
        run_count: usize,
    ) -> Result<BTreeMap<String, Moments>> {
        let workspace = Workspace::provision(
            self.workspace_config.clone(),
            self.build_plan.clone(),
            self.engine,
        )?;

        let mut accumulator = BaselineAccumulator::new(components);
        for iteration in 0..run_count {
            println!("{}", format!("Launch iteration {iteration}").yellow());
            workspace.run_simulation()?;
            let reader = DatReader::open(workspace.rendered_config())?;
            for (component, frame_path) in components.iter() {
                let slice = reader.frame_slice(component, frame_path, frame)?;
                accumulator.push(component, Moments::from_samples(&slice))?;
            }
            println!(
                "{}{}",
                format!("iteration {iteration} ").yellow(),
                "done".blue()
            );
        }
        Ok(accumulator.finalize())
    }

    /// Builds and runs once, then renders summary artifacts for every
    /// configured probe through the renderer collaborator. Fails fatally
    /// when an expected artifact file is absent afterwards.
    pub fn regress(&self) -> Result<ScenarioStatus> {
        let workspace = Workspace::provision(
            self.workspace_config.clone(),
            self.build_plan.clone(),
            self.engine,
        )?;
        workspace.run_simulation()?;

        let reader = DatReader::open(workspace.rendered_config())?;
        let out_dir = self.workspace_config.project_root.clone();
        let time = reader.time_range();
        let probes = reader.probes().to_vec();
        let mut artifacts = Vec::new();

        for probe in &probes {
            match probe.kind {
                ProbeKind::Frame => {
                    let frame = reader.frame_for_timestamp(REPORT_TIMESTAMP, probe.schedule);
                    let frame_path = format!(
                        "rec/{}-{}_{}-{}",
                        probe.r_start, probe.r_end, probe.z_start, probe.z_end
                    );
                    let data = reader.frame_slice(&probe.component, &frame_path, frame)?;
                    let name = format!("field_{}", artifact_stem(&probe.component));
                    artifacts.push(self.renderer.render_field_frame(&name, &data, &out_dir)?);
                }
                ProbeKind::Dot => {
                    let start = reader.frame_for_timestamp(time.start, probe.schedule);
                    let end = reader
                        .frame_for_timestamp(time.end, probe.schedule)
                        .saturating_sub(1);
                    let series = reader.frame_range_at_point(
                        &probe.component,
                        probe.r_start,
                        probe.z_start,
                        start,
                        end,
                    )?;
                    let timeline = linspace(time.start, time.end, series.len());
                    let name = format!(
                        "point_{}_{}-{}",
                        artifact_stem(&probe.component),
                        probe.r_start,
                        probe.z_start
                    );
                    artifacts.push(self.renderer.render_series(
                        &name,
                        &timeline,
                        &[(probe.component.as_str(), &series)],
                        &out_dir,
                    )?);
                }
                ProbeKind::MpFrame => {
                    let mpframe_dir = format!(
                        "mpframe_{}:{}_{}:{}",
                        probe.r_start, probe.z_start, probe.r_end, probe.z_end
                    );
                    let start = reader.frame_for_timestamp(time.start, probe.schedule);
                    let end = reader
                        .frame_for_timestamp(time.end, probe.schedule)
                        .saturating_sub(1);
                    let mut per_axis: Vec<Vec<f64>> = Vec::new();
                    for axis in ["vel_r", "vel_phi", "vel_z"] {
                        let mut axis_series = Vec::new();
                        for frame in start..=end {
                            let velocities = reader.frame_slice(
                                &probe.component,
                                &format!("{mpframe_dir}/{axis}"),
                                frame,
                            )?;
                            let magnitudes: Vec<f64> =
                                velocities.iter().map(|v| v.abs()).collect();
                            axis_series.push(Moments::from_samples(&magnitudes).mean);
                        }
                        per_axis.push(axis_series);
                    }
                    let timeline = linspace(time.start, time.end, per_axis[0].len());
                    let name = format!("temperature_{}", artifact_stem(&probe.component));
                    let labelled: Vec<(&str, &[f64])> = [("r", 0usize), ("phi", 1), ("z", 2)]
                        .iter()
                        .map(|&(label, i)| (label, per_axis[i].as_slice()))
                        .collect();
                    artifacts.push(self.renderer.render_series(
                        &name,
                        &timeline,
                        &labelled,
                        &out_dir,
                    )?);
                }
            }
        }

        for artifact in &artifacts {
            if !artifact.is_file() {
                return Err(HarnessError::Environment {
                    path: artifact.clone(),
                });
            }
        }
        Ok(ScenarioStatus::Passed)
    }
}

/// Prints the baseline summary as one key-sorted JSON document per
/// statistic kind.
pub fn print_baseline_summary(summary: &BTreeMap<String, Moments>, frame: u32) {
    for kind in StatKind::ALL {
        let values: BTreeMap<&str, f64> = summary
            .iter()
            .map(|(component, moments)| (component.as_str(), moments.get(kind)))
            .collect();
        let json =
            serde_json::to_string_pretty(&values).unwrap_or_else(|_| "{}".to_string());
        println!(
            "{}",
            format!(
                "`{}` mean values for simulation frame {frame}:",
                kind.label()
            )
            .yellow()
        );
        println!("{json}");
    }
}

fn artifact_stem(component: &str) -> String {
    component.replace('/', "_")
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::render::DataDumpRenderer;
    use crate::template::FileTemplateEngine;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    const TEMPLATE: &str = r#"{
        "data_root": "{{ result_path }}/simulation_result",
        "geometry": { "r": 32, "z": 128 },
        "time": { "start": 0.0, "end": 1e-8, "step": 1e-12 },
        "constants": { "electron_charge": 1.6e-19, "bunch_density": {{ macro_amount }} },
        "probes": []
    }"#;

    /// Fake simulation: a script that counts its launches in the project
    /// root and dumps `<count>` four times as the E/r frame-4 slice.
    const FAKE_SIM: &str = "#!/bin/sh\n\
        n=$(cat ../launches 2>/dev/null || echo 0)\n\
        n=$((n+1))\n\
        echo $n > ../launches\n\
        mkdir -p ./simulation_result/E/r/rec/0-32_0-128\n\
        echo \"$n $n $n $n\" > ./simulation_result/E/r/rec/0-32_0-128/4.dat\n";

    struct Fixture {
        _dir: tempfile::TempDir,
        root: std::path::PathBuf,
        config: WorkspaceConfig,
        plan: BuildPlan,
        engine: FileTemplateEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::write(root.join("picsim"), FAKE_SIM).unwrap();
        fs::set_permissions(root.join("picsim"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::create_dir_all(root.join("tools")).unwrap();
        fs::write(root.join("tools/keep"), "").unwrap();
        fs::create_dir_all(root.join("tmpl")).unwrap();
        fs::write(root.join("tmpl/sim.json.tmpl"), TEMPLATE).unwrap();
        fs::create_dir_all(root.join("true_data")).unwrap();

        let mut config = WorkspaceConfig::rooted_at(root.clone());
        config.template_dir = root.join("tmpl");
        let plan = BuildPlan {
            distclean: "true".to_string(),
            bootstrap: "true".to_string(),
            configure_strict: "true".to_string(),
            configure_relaxed: "true".to_string(),
            build: "true".to_string(),
            clean: "true".to_string(),
        };
        let engine = FileTemplateEngine::new(root.join("tmpl"));
        Fixture {
            _dir: dir,
            root,
            config,
            plan,
            engine,
        }
    }

    fn write_reference(root: &Path, content: &str) {
        let dir = root.join("true_data/E/r/rec/0-32_0-128");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("4.dat"), content).unwrap();
    }

    fn components() -> ComponentSet {
        let mut set = ComponentSet::new();
        set.declare("E/r", "rec/0-32_0-128").unwrap();
        set
    }

    fn launches(root: &Path) -> u32 {
        fs::read_to_string(root.join("launches"))
            .map(|s| s.trim().parse().unwrap())
            .unwrap_or(0)
    }

    fn orchestrator<'a>(fx: &'a Fixture, renderer: &'a DataDumpRenderer) -> TestOrchestrator<'a> {
        TestOrchestrator::new(
            fx.config.clone(),
            fx.plan.clone(),
            fx.root.join("true_data"),
            &fx.engine,
            renderer,
            RetryPolicy::default(),
        )
    }

    #[test]
    fn validate_succeeds_at_the_matching_attempt_and_stops() {
        let fx = fixture();
        // slice on launch n is [n,n,n,n]: mean n, std 0, var 0.
        // reference expects the third launch.
        write_reference(&fx.root, "3.0 0.0 0.0\n");
        let renderer = DataDumpRenderer;
        let orch = orchestrator(&fx, &renderer);

        let tol = ToleranceConfig::new(0.15, 0.0).unwrap();
        let status = orch.validate(&components(), 4, tol).unwrap();
        assert!(status.is_pass());
        assert_eq!(launches(&fx.root), 3);
        assert!(!fx.root.join("testingdir").exists());
    }

    #[test]
    fn validate_fails_after_all_attempts() {
        let fx = fixture();
        write_reference(&fx.root, "1000.0 0.0 0.0\n");
        let renderer = DataDumpRenderer;
        let orch = orchestrator(&fx, &renderer);

        let tol = ToleranceConfig::new(0.15, 0.0).unwrap();
        let status = orch.validate(&components(), 4, tol).unwrap();
        assert_eq!(status, ScenarioStatus::Failed);
        assert_eq!(launches(&fx.root), 4);
        assert!(!fx.root.join("testingdir").exists());
    }

    #[test]
    fn build_error_aborts_without_retry_and_tears_down() {
        let fx = fixture();
        write_reference(&fx.root, "1.0 0.0 0.0\n");
        let mut plan = fx.plan.clone();
        plan.build = "exit 9".to_string();
        let renderer = DataDumpRenderer;
        let orch = TestOrchestrator::new(
            fx.config.clone(),
            plan,
            fx.root.join("true_data"),
            &fx.engine,
            &renderer,
            RetryPolicy::default(),
        );

        let tol = ToleranceConfig::new(0.15, 0.0).unwrap();
        let err = orch.validate(&components(), 4, tol);
        assert!(matches!(err, Err(HarnessError::Build { code: 9, .. })));
        assert_eq!(launches(&fx.root), 0);
        assert!(!fx.root.join("testingdir").exists());
    }

    #[test]
    fn baseline_averages_repeated_launches() {
        let fx = fixture();
        let renderer = DataDumpRenderer;
        let orch = orchestrator(&fx, &renderer);

        let summary = orch.collect_baseline(&components(), 4, 3).unwrap();
        assert_eq!(launches(&fx.root), 3);
        // launches dumped means 1, 2, 3 -> averaged mean 2
        let e_r = &summary["E/r"];
        assert!((e_r.mean - 2.0).abs() < 1e-12);
        assert!(e_r.std.abs() < 1e-12);
        assert!(e_r.var.abs() < 1e-12);
    }

    const REGRESS_TEMPLATE: &str = r#"{
        "data_root": "{{ result_path }}/simulation_result",
        "geometry": { "r": 32, "z": 128 },
        "time": { "start": 0.0, "end": 1e-8, "step": 1e-9 },
        "constants": { "electron_charge": 1.6e-19, "bunch_density": {{ macro_amount }} },
        "probes": [
            { "kind": "frame", "component": "E/r", "schedule": 1,
              "r_start": 0, "z_start": 0, "r_end": 32, "z_end": 128 },
            { "kind": "dot", "component": "E/z", "schedule": 2,
              "r_start": 34, "z_start": 341 }
        ]
    }"#;

    /// Dumps a frame-probe slice at the report frame (1e-8 / 1e-9 = 10)
    /// and a dot-probe series over frames 0..=4.
    const REGRESS_SIM: &str = "#!/bin/sh\n\
        mkdir -p ./simulation_result/E/r/rec/0-32_0-128\n\
        echo '1.0 2.0 3.0' > ./simulation_result/E/r/rec/0-32_0-128/10.dat\n\
        mkdir -p './simulation_result/E/z/dot_34:341'\n\
        for i in 0 1 2 3 4; do\n\
            echo \"$i.5\" > \"./simulation_result/E/z/dot_34:341/$i.dat\"\n\
        done\n";

    fn regress_fixture() -> Fixture {
        let fx = fixture();
        fs::write(fx.root.join("picsim"), REGRESS_SIM).unwrap();
        fs::set_permissions(fx.root.join("picsim"), fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(fx.root.join("tmpl/sim.json.tmpl"), REGRESS_TEMPLATE).unwrap();
        fx
    }

    #[test]
    fn regress_renders_probe_artifacts() {
        let fx = regress_fixture();
        let renderer = DataDumpRenderer;
        let orch = orchestrator(&fx, &renderer);

        let status = orch.regress().unwrap();
        assert!(status.is_pass());
        assert!(fx.root.join("field_E_r.dat").is_file());
        let series = fs::read_to_string(fx.root.join("point_E_z_34-341.dat")).unwrap();
        assert!(series.starts_with("# t E/z\n"));
        assert_eq!(series.lines().count(), 6);
    }

    /// Claims artifact paths without writing them.
    struct PhantomRenderer;

    impl SummaryRenderer for PhantomRenderer {
        fn render_field_frame(
            &self,
            name: &str,
            _data: &[f64],
            out_dir: &Path,
        ) -> crate::error::Result<std::path::PathBuf> {
            Ok(out_dir.join(format!("{name}.dat")))
        }

        fn render_series(
            &self,
            name: &str,
            _timeline: &[f64],
            _series: &[(&str, &[f64])],
            out_dir: &Path,
        ) -> crate::error::Result<std::path::PathBuf> {
            Ok(out_dir.join(format!("{name}.dat")))
        }
    }

    #[test]
    fn regress_fails_fatally_when_artifacts_are_absent() {
        let fx = regress_fixture();
        let renderer = PhantomRenderer;
        let orch = TestOrchestrator::new(
            fx.config.clone(),
            fx.plan.clone(),
            fx.root.join("true_data"),
            &fx.engine,
            &renderer,
            RetryPolicy::default(),
        );

        let err = orch.regress();
        assert!(matches!(err, Err(HarnessError::Environment { .. })));
    }

    #[test]
    fn missing_reference_file_aborts_validation() {
        let fx = fixture();
        let renderer = DataDumpRenderer;
        let orch = orchestrator(&fx, &renderer);
        let tol = ToleranceConfig::new(0.15, 0.0).unwrap();
        let err = orch.validate(&components(), 4, tol);
        assert!(matches!(err, Err(HarnessError::Environment { .. })));
    }
}
