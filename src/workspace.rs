//! Build→configure→run lifecycle and the on-disk scratch directory.
//!
//! A `Workspace` is exclusively owned by one scenario attempt. Teardown is
//! tied to scope exit through `Drop`, so it runs exactly once on every exit
//! path without depending on any collector timing, and it is best-effort:
//! failures during teardown are swallowed, never propagated.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use colored::Colorize;

use crate::error::{HarnessError, Result};
use crate::process;
use crate::template::{TemplateEngine, TemplateParams};

/// Shell verbs driving the external build system.
///
/// Every step follows the conventional zero-success exit code contract.
/// Carried as data so tests can substitute no-op commands.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    /// Full tree clean before a rebuild.
    pub distclean: String,
    /// Build system bootstrap.
    pub bootstrap: String,
    /// Configure for IEEE-conformant single-thread math.
    pub configure_strict: String,
    /// Configure for fast-math multi-thread numerics.
    pub configure_relaxed: String,
    /// Compile the simulation binary.
    pub build: String,
    /// Post-run clean invoked during teardown.
    pub clean: String,
}

impl Default for BuildPlan {
    fn default() -> Self {
        Self {
            distclean: "make distclean".to_string(),
            bootstrap: "./autogen.sh".to_string(),
            configure_strict: "./configure --enable-ieee --enable-singlethread".to_string(),
            configure_relaxed: "./configure --disable-ieee --disable-singlethread".to_string(),
            build: "make build".to_string(),
            clean: "make clean".to_string(),
        }
    }
}

/// Explicit workspace configuration; no ambient paths or environment
/// lookups are consulted.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Root of the simulation source tree holding the build system.
    pub project_root: PathBuf,
    /// Scratch directory name, created under the project root.
    pub scratch_dir_name: String,
    /// Directory holding configuration templates.
    pub template_dir: PathBuf,
    /// Template file name to render.
    pub template_name: String,
    /// File name of the rendered configuration inside the scratch dir.
    pub rendered_config_name: String,
    /// Simulation executable name produced by the build.
    pub binary_name: String,
    /// Auxiliary tools directory copied next to the binary.
    pub tools_dir_name: String,
    /// Result path parameter handed to the template.
    pub result_path: String,
    /// Macro-particle amount parameter handed to the template.
    pub macro_amount: f64,
    /// Retain the scratch directory after the run, for inspection.
    pub keep_after_run: bool,
    /// Build with IEEE-conformant single-thread math.
    pub strict_math: bool,
    /// Stream child output and print step banners.
    pub verbose: bool,
}

impl WorkspaceConfig {
    /// Config rooted at `project_root` with the conventional names.
    #[must_use]
    pub fn rooted_at(project_root: PathBuf) -> Self {
        let template_dir = project_root.join("test/functional");
        Self {
            project_root,
            scratch_dir_name: "testingdir".to_string(),
            template_dir,
            template_name: "sim.json.tmpl".to_string(),
            rendered_config_name: "sim.json".to_string(),
            binary_name: "picsim".to_string(),
            tools_dir_name: "tools".to_string(),
            result_path: ".".to_string(),
            macro_amount: 2.1e5,
            keep_after_run: false,
            strict_math: true,
            verbose: false,
        }
    }
}

/// One provisioned build-and-run sandbox.
#[derive(Debug)]
pub struct Workspace {
    config: WorkspaceConfig,
    build_plan: BuildPlan,
    scratch_dir: PathBuf,
    rendered_config: PathBuf,
    torn_down: bool,
}

impl Workspace {
    /// Builds the simulation and prepares the scratch directory:
    /// clean → bootstrap → configure → build, then scratch dir creation,
    /// binary and tools copy, and template rendering. Any nonzero step exit
    /// aborts as `Build`; the partially provisioned workspace is torn down
    /// on the way out.
    pub fn provision(
        config: WorkspaceConfig,
        build_plan: BuildPlan,
        engine: &dyn TemplateEngine,
    ) -> Result<Self> {
        let scratch_dir = config.project_root.join(&config.scratch_dir_name);
        let rendered_config = scratch_dir.join(&config.rendered_config_name);
        let mut workspace = Self {
            config,
            build_plan,
            scratch_dir,
            rendered_config,
            torn_down: false,
        };
        match workspace.bootstrap(engine) {
            Ok(()) => Ok(workspace),
            Err(e) => {
                workspace.teardown();
                Err(e)
            }
        }
    }

    fn bootstrap(&self, engine: &dyn TemplateEngine) -> Result<()> {
        println!("Preparing the code");
        self.build_step(&self.build_plan.distclean)?;
        self.build_step(&self.build_plan.bootstrap)?;
        let configure = if self.config.strict_math {
            &self.build_plan.configure_strict
        } else {
            &self.build_plan.configure_relaxed
        };
        self.build_step(configure)?;
        self.build_step(&self.build_plan.build)?;

        println!("Copying files to testing directory");
        println!("{}", self.scratch_dir.display());
        force_recreate_dir(&self.scratch_dir)?;

        let binary_src = self.config.project_root.join(&self.config.binary_name);
        if !binary_src.is_file() {
            return Err(HarnessError::Environment { path: binary_src });
        }
        fs::copy(&binary_src, self.scratch_dir.join(&self.config.binary_name))?;

        let tools_src = self.config.project_root.join(&self.config.tools_dir_name);
        if !tools_src.is_dir() {
            return Err(HarnessError::Environment { path: tools_src });
        }
        copy_dir_recursive(
            &tools_src,
            &self.scratch_dir.join(&self.config.tools_dir_name),
        )?;

        let mut params = TemplateParams::new();
        params.insert("result_path".to_string(), self.config.result_path.clone());
        params.insert(
            "macro_amount".to_string(),
            format!("{}", self.config.macro_amount),
        );
        let rendered = engine.render(&self.config.template_name, &params)?;
        fs::write(&self.rendered_config, rendered)?;

        Ok(())
    }

    fn build_step(&self, step: &str) -> Result<()> {
        let code = process::execute(
            step,
            &self.config.project_root,
            self.config.verbose,
            true,
        )?
        .unwrap_or(-1);
        if code == 0 {
            Ok(())
        } else {
            Err(HarnessError::Build {
                step: step.to_string(),
                code,
            })
        }
    }

    /// Launches the built binary inside the scratch directory, streaming
    /// its output when verbose and reporting wall-clock duration. A nonzero
    /// exit aborts the attempt.
    pub fn run_simulation(&self) -> Result<()> {
        println!("Launching application to prepare data for testing");
        if self.config.verbose {
            println!("\nApplication Output:\n===================\n");
        }
        let command = format!("./{}", self.config.binary_name);
        let start = Instant::now();
        let code = process::execute(&command, &self.scratch_dir, self.config.verbose, true)?
            .unwrap_or(-1);
        let elapsed = start.elapsed();
        if self.config.verbose {
            println!("\nEnd of application Output.\n==========================\n");
        }
        println!(
            "{}",
            format!("Execution time is {:.2} s.", elapsed.as_secs_f64()).cyan()
        );
        if code == 0 {
            Ok(())
        } else {
            Err(HarnessError::Build {
                step: command,
                code,
            })
        }
    }

    /// Scratch directory of this attempt.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Path of the rendered configuration file.
    #[must_use]
    pub fn rendered_config(&self) -> &Path {
        &self.rendered_config
    }

    /// Best-effort teardown: removes the scratch directory (unless the
    /// config keeps it) and runs the build clean verb. Idempotent; safe
    /// when the directory is already gone; never propagates failure.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        println!("Clearing testing data");
        if !self.config.keep_after_run {
            let _ = fs::remove_dir_all(&self.scratch_dir);
        }
        let _ = process::execute(&self.build_plan.clean, &self.config.project_root, false, true);
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Recreates `path` from scratch, tolerating a missing entry and falling
/// back to single-file removal when the recursive delete fails.
fn force_recreate_dir(path: &Path) -> Result<()> {
    if path.exists() && fs::remove_dir_all(path).is_err() {
        let _ = fs::remove_file(path);
    }
    fs::create_dir_all(path)?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::FileTemplateEngine;

    /// Project tree with a fake binary, tools dir and template; all build
    /// verbs are no-ops so provisioning exercises only the harness side.
    fn fake_project(template: &str) -> (tempfile::TempDir, WorkspaceConfig, BuildPlan) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::write(root.join("picsim"), "#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(root.join("picsim"), fs::Permissions::from_mode(0o755)).unwrap();
        }
        fs::create_dir_all(root.join("tools/sub")).unwrap();
        fs::write(root.join("tools/helper.sh"), "echo helper\n").unwrap();
        fs::write(root.join("tools/sub/nested.txt"), "x\n").unwrap();
        fs::create_dir_all(root.join("tmpl")).unwrap();
        fs::write(root.join("tmpl/sim.json.tmpl"), template).unwrap();

        let mut config = WorkspaceConfig::rooted_at(root);
        config.template_dir = config.project_root.join("tmpl");
        let plan = BuildPlan {
            distclean: "true".to_string(),
            bootstrap: "true".to_string(),
            configure_strict: "true".to_string(),
            configure_relaxed: "true".to_string(),
            build: "true".to_string(),
            clean: "true".to_string(),
        };
        (dir, config, plan)
    }

    const TEMPLATE: &str = r#"{"out": "{{ result_path }}", "n": {{ macro_amount }}}"#;

    #[test]
    fn provision_copies_binary_tools_and_renders_config() {
        let (_dir, config, plan) = fake_project(TEMPLATE);
        let engine = FileTemplateEngine::new(config.template_dir.clone());
        let ws = Workspace::provision(config, plan, &engine).unwrap();

        assert!(ws.scratch_dir().join("picsim").is_file());
        assert!(ws.scratch_dir().join("tools/sub/nested.txt").is_file());
        let rendered = fs::read_to_string(ws.rendered_config()).unwrap();
        assert!(rendered.contains(r#""out": ".""#));
        assert!(rendered.contains("210000"));
    }

    #[test]
    fn teardown_removes_scratch_dir_on_drop() {
        let (_dir, config, plan) = fake_project(TEMPLATE);
        let engine = FileTemplateEngine::new(config.template_dir.clone());
        let scratch = {
            let ws = Workspace::provision(config, plan, &engine).unwrap();
            ws.scratch_dir().to_path_buf()
        };
        assert!(!scratch.exists());
    }

    #[test]
    fn keep_after_run_retains_scratch_dir() {
        let (_dir, mut config, plan) = fake_project(TEMPLATE);
        config.keep_after_run = true;
        let engine = FileTemplateEngine::new(config.template_dir.clone());
        let scratch = {
            let ws = Workspace::provision(config, plan, &engine).unwrap();
            ws.scratch_dir().to_path_buf()
        };
        assert!(scratch.exists());
    }

    #[test]
    fn teardown_tolerates_already_removed_dir() {
        let (_dir, config, plan) = fake_project(TEMPLATE);
        let engine = FileTemplateEngine::new(config.template_dir.clone());
        let mut ws = Workspace::provision(config, plan, &engine).unwrap();
        fs::remove_dir_all(ws.scratch_dir()).unwrap();
        ws.teardown();
        // drop runs teardown again; both are no-ops
    }

    #[test]
    fn failing_build_step_aborts_as_build_error() {
        let (_dir, config, mut plan) = fake_project(TEMPLATE);
        plan.build = "exit 2".to_string();
        let engine = FileTemplateEngine::new(config.template_dir.clone());
        let err = Workspace::provision(config, plan, &engine);
        assert!(matches!(
            err,
            Err(HarnessError::Build { code: 2, .. })
        ));
    }

    #[test]
    fn configure_verb_follows_strict_math_flag() {
        let (_dir, mut config, mut plan) = fake_project(TEMPLATE);
        config.strict_math = false;
        // relaxed verb fails so its selection is observable
        plan.configure_relaxed = "exit 5".to_string();
        let engine = FileTemplateEngine::new(config.template_dir.clone());
        let err = Workspace::provision(config, plan, &engine);
        assert!(matches!(err, Err(HarnessError::Build { code: 5, .. })));
    }

    #[cfg(unix)]
    #[test]
    fn run_simulation_executes_copied_binary() {
        let (_dir, config, plan) = fake_project(TEMPLATE);
        let engine = FileTemplateEngine::new(config.template_dir.clone());
        let ws = Workspace::provision(config, plan, &engine).unwrap();
        ws.run_simulation().unwrap();
    }

    #[test]
    fn force_recreate_clears_stale_contents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("scratch");
        fs::create_dir_all(target.join("stale")).unwrap();
        fs::write(target.join("stale/file"), "x").unwrap();
        force_recreate_dir(&target).unwrap();
        assert!(target.is_dir());
        assert!(!target.join("stale").exists());
    }
}
