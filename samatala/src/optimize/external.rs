//! Optimizer delegated to an external command.
//!
//! The command receives both height maps as `.npy` files plus the profile as
//! named arguments, and must write the flat control vector
//! `[p1, v1, p2, v2, ...]` to the `--output` file. Any mix of commas,
//! whitespace and brackets between the numbers is accepted, so both
//! `numpy.savetxt` and a printed list work.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use super::{ControlOptimizer, OptimizerProfile, check_inputs, check_output};
use crate::core::{ControlSequence, HeightMap};
use crate::error::{Error, Result};
use crate::io::{encode_npy, write_atomic};

/// Runs an optimizer executable per call.
#[derive(Debug, Clone)]
pub struct ExternalOptimizer {
    command: PathBuf,
    args: Vec<String>,
    model_path: Option<PathBuf>,
    working_dir: Option<PathBuf>,
}

impl ExternalOptimizer {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            model_path: None,
            working_dir: None,
        }
    }

    /// Leading arguments placed before the generated ones (e.g. a script path).
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_model(mut self, model_path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(model_path.into());
        self
    }

    /// Directory the command runs in, instead of the process's current one.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn build_command(
        &self,
        initial: &Path,
        desired: &Path,
        output: &Path,
        profile: &OptimizerProfile,
    ) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg("--initial")
            .arg(initial)
            .arg("--desired")
            .arg(desired)
            .arg("--output")
            .arg(output)
            .arg("--lr")
            .arg(profile.learning_rate.to_string())
            .arg("--num-iters")
            .arg(profile.num_iters.to_string())
            .arg("--time-weight")
            .arg(profile.time_weight.to_string())
            .arg("--case")
            .arg(profile.case.name())
            .arg("--scenario")
            .arg(&profile.scenario)
            .arg("--seed")
            .arg(profile.seed.to_string());
        if let Some(model) = &self.model_path {
            cmd.arg("--model").arg(model);
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl ControlOptimizer for ExternalOptimizer {
    fn optimize(
        &self,
        initial: &HeightMap,
        desired: &HeightMap,
        profile: &OptimizerProfile,
    ) -> Result<ControlSequence> {
        check_inputs(initial, desired, profile)?;

        let scratch = TempDir::with_prefix("samatala-opt-")?;
        let initial_path = scratch.path().join("initial.npy");
        let desired_path = scratch.path().join("desired.npy");
        let output_path = scratch.path().join("control.txt");
        for (path, map) in [(&initial_path, initial), (&desired_path, desired)] {
            let bytes = encode_npy(map).map_err(|e| Error::storage(path, e))?;
            write_atomic(path, &bytes)?;
        }

        let mut cmd = self.build_command(&initial_path, &desired_path, &output_path, profile);
        log::info!("Running external optimizer: {:?}", cmd);
        let output = cmd.output().map_err(|e| {
            Error::OptimizationDivergence(format!(
                "failed to launch {}: {}",
                self.command.display(),
                e
            ))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::OptimizationDivergence(format!(
                "{} exited with {}: {}",
                self.command.display(),
                output.status,
                stderr.trim()
            )));
        }

        let text = fs::read_to_string(&output_path).map_err(|e| {
            Error::OptimizationDivergence(format!("optimizer wrote no output file: {}", e))
        })?;
        let values = parse_flat(&text)?;
        check_output(ControlSequence::from_flat(&values, profile.actuators)?, profile)
    }

    fn name(&self) -> &'static str {
        "external"
    }
}

/// Numbers separated by commas, whitespace or brackets.
fn parse_flat(text: &str) -> Result<Vec<f32>> {
    text.split(|c: char| c == ',' || c == '[' || c == ']' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f32>().map_err(|_| {
                Error::OptimizationDivergence(format!("optimizer output has non-number {:?}", s))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_formats() {
        assert_eq!(parse_flat("0.1,0.2\n0.3,0.4\n").unwrap(), vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(parse_flat("[0.1 0.2 0.3 0.4]").unwrap(), vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(
            parse_flat("1.0e-1 2.0e-1\n3.0e-1 4.0e-1\n").unwrap(),
            vec![0.1, 0.2, 0.3, 0.4]
        );
        assert!(parse_flat("0.1, nan?").is_err());
    }

    #[test]
    fn test_arguments() {
        let optimizer = ExternalOptimizer::new("python3")
            .with_args(vec!["optimize.py".to_string()])
            .with_model("model.pt");
        let cmd = optimizer.build_command(
            Path::new("i.npy"),
            Path::new("d.npy"),
            Path::new("o.txt"),
            &OptimizerProfile::default(),
        );
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "optimize.py", "--initial", "i.npy", "--desired", "d.npy", "--output", "o.txt",
                "--lr", "0.0005", "--num-iters", "2000", "--time-weight", "0.000001", "--case",
                "center", "--scenario", "init-mid", "--seed", "0", "--model", "model.pt",
            ]
        );
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("opt.sh");
            fs::write(
                &path,
                format!(
                    "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  case \"$1\" in\n    --output) OUT=\"$2\"; shift;;\n    --initial) test -s \"$2\" || exit 9; shift;;\n  esac\n  shift\ndone\n{}\n",
                    body
                ),
            )
            .unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn test_reads_output_file() {
            let dir = TempDir::new().unwrap();
            let exe = script(dir.path(), "printf '0.5,-0.25\\n0.125,0.75\\n' > \"$OUT\"");

            let seq = ExternalOptimizer::new(exe)
                .optimize(
                    &HeightMap::zeros(4, 4),
                    &HeightMap::zeros(4, 4),
                    &OptimizerProfile::default(),
                )
                .unwrap();
            assert_eq!(seq.flatten(), vec![0.5, -0.25, 0.125, 0.75]);
        }

        #[test]
        fn test_runs_in_working_dir() {
            let dir = TempDir::new().unwrap();
            let work = TempDir::new().unwrap();
            let exe = script(
                dir.path(),
                "pwd > launched_from.txt\necho '0.5 0.25' > \"$OUT\"",
            );

            ExternalOptimizer::new(exe)
                .with_working_dir(work.path())
                .optimize(
                    &HeightMap::zeros(4, 4),
                    &HeightMap::zeros(4, 4),
                    &OptimizerProfile {
                        actuators: 1,
                        ..Default::default()
                    },
                )
                .unwrap();
            let launched = fs::read_to_string(work.path().join("launched_from.txt")).unwrap();
            assert_eq!(
                PathBuf::from(launched.trim()).canonicalize().unwrap(),
                work.path().canonicalize().unwrap()
            );
        }

        #[test]
        fn test_wrong_count_is_divergence() {
            let dir = TempDir::new().unwrap();
            let exe = script(dir.path(), "echo '0.5 0.25 0.1' > \"$OUT\"");

            let err = ExternalOptimizer::new(exe)
                .optimize(
                    &HeightMap::zeros(4, 4),
                    &HeightMap::zeros(4, 4),
                    &OptimizerProfile::default(),
                )
                .unwrap_err();
            assert!(matches!(err, Error::OptimizationDivergence(_)));
        }

        #[test]
        fn test_failure_exit_is_divergence() {
            let dir = TempDir::new().unwrap();
            let exe = script(dir.path(), "echo boom >&2\nexit 1");

            let err = ExternalOptimizer::new(exe)
                .optimize(
                    &HeightMap::zeros(4, 4),
                    &HeightMap::zeros(4, 4),
                    &OptimizerProfile::default(),
                )
                .unwrap_err();
            match err {
                Error::OptimizationDivergence(msg) => assert!(msg.contains("boom")),
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
