// src/exec/process.rs

//! Local process execution.
//!
//! Commands come from `[worker]` in the config and run through `sh -c`
//! after `{placeholder}` substitution.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{BatchError, Result};
use crate::exec::backend::{LocalArtifact, RunReport, SimulationInvoker, StagedInputs};
use crate::types::BoxFuture;
use crate::units::{ArtifactRef, SimulationUnit};

/// Lines of stderr kept in a compute diagnostic.
const DIAGNOSTIC_TAIL_LINES: usize = 20;

/// Quote `value` as one `sh` word. Values made only of path and identifier
/// characters are left as they are.
pub fn shell_quote(value: &str) -> String {
    let plain = |c: char| c.is_ascii_alphanumeric() || "_-./:=,@%+".contains(c);
    if !value.is_empty() && value.chars().all(plain) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Replace every `{name}` in `template` with its value, quoted as a single
/// shell word. Unknown placeholders are left untouched.
pub fn render_command(template: &str, vars: &[(&str, String)]) -> String {
    render_command_with_lists(template, vars, &[])
}

/// [`render_command`] plus list placeholders, which expand to one quoted
/// word per item.
pub fn render_command_with_lists(
    template: &str,
    vars: &[(&str, String)],
    lists: &[(&str, Vec<String>)],
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            rest = &rest[open..];
            break;
        };
        let name = &after[..close];
        if let Some((_, value)) = vars.iter().find(|(n, _)| *n == name) {
            out.push_str(&shell_quote(value));
        } else if let Some((_, items)) = lists.iter().find(|(n, _)| *n == name) {
            let words: Vec<String> = items.iter().map(|item| shell_quote(item)).collect();
            out.push_str(&words.join(" "));
        } else {
            out.push('{');
            rest = after;
            continue;
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Placeholders describing `unit` and its scratch files.
pub fn unit_vars(unit: &SimulationUnit, scratch_dir: &Path) -> Vec<(&'static str, String)> {
    let path = |artifact: ArtifactRef| artifact.local_path(scratch_dir).display().to_string();
    vec![
        ("basin_id", unit.basin_id.clone()),
        ("experiment", unit.experiment.clone()),
        ("model", unit.model.clone()),
        ("step", unit.step.clone()),
        ("year_month", unit.year_month.to_string()),
        ("scratch", scratch_dir.display().to_string()),
        ("forcing_volume", path(ArtifactRef::forcing_volume(unit))),
        ("initial_state", path(ArtifactRef::initial_state(unit))),
        ("output_series", path(ArtifactRef::output_series(unit))),
        ("final_state", path(ArtifactRef::final_state(unit))),
    ]
}

/// Run `cmd` with `sh -c`, capturing stdout and stderr.
pub async fn run_shell(cmd: &str) -> Result<Output> {
    debug!(cmd = %cmd, "spawning shell command");
    let output = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;
    Ok(output)
}

/// Exit code plus the tail of stderr, for error messages.
pub fn diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    let tail = lines[lines.len().saturating_sub(DIAGNOSTIC_TAIL_LINES)..].join("\n");
    match output.status.code() {
        Some(code) => format!("exit code {code}: {tail}"),
        None => format!("terminated by signal: {tail}"),
    }
}

/// Runs the routing executable locally.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    routing_cmd: String,
    scratch_dir: PathBuf,
}

impl ProcessInvoker {
    pub fn new(routing_cmd: impl Into<String>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            routing_cmd: routing_cmd.into(),
            scratch_dir: scratch_dir.into(),
        }
    }

    fn render(&self, unit: &SimulationUnit, inputs: &StagedInputs) -> String {
        let mut vars = unit_vars(unit, &self.scratch_dir);
        if inputs.initial_state.is_none() {
            // the origin starts from a cold state
            vars.retain(|(name, _)| *name != "initial_state");
            vars.push(("initial_state", String::new()));
        }
        render_command(&self.routing_cmd, &vars)
    }
}

impl SimulationInvoker for ProcessInvoker {
    fn run<'a>(
        &'a self,
        unit: &'a SimulationUnit,
        inputs: &'a StagedInputs,
    ) -> BoxFuture<'a, Result<RunReport>> {
        Box::pin(async move {
            let cmd = self.render(unit, inputs);
            info!(unit = %unit, cmd = %cmd, "starting routing process");

            let started = Instant::now();
            let output = run_shell(&cmd).await.map_err(|err| BatchError::Compute {
                unit: unit.to_string(),
                diagnostic: err.to_string(),
            })?;
            let duration = started.elapsed();

            if !output.status.success() {
                let diagnostic = diagnostic(&output);
                warn!(unit = %unit, %diagnostic, "routing process failed");
                return Err(BatchError::Compute {
                    unit: unit.to_string(),
                    diagnostic,
                });
            }

            info!(
                unit = %unit,
                elapsed_ms = duration.as_millis() as u64,
                "routing process exited"
            );

            let outputs = [ArtifactRef::output_series(unit), ArtifactRef::final_state(unit)]
                .into_iter()
                .map(|artifact| {
                    let path = artifact.local_path(&self.scratch_dir);
                    LocalArtifact::new(artifact, path)
                })
                .collect();

            Ok(RunReport {
                outputs,
                duration,
                peak_memory_mb: None,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> SimulationUnit {
        SimulationUnit::new("74", "GLDAS", "VIC", "3H", "1980-01".parse().unwrap())
    }

    #[test]
    fn renders_unit_placeholders() {
        let vars = unit_vars(&unit(), Path::new("/scratch"));
        let cmd = render_command("rapid {basin_id} {year_month} {forcing_volume} {unknown}", &vars);
        assert_eq!(
            cmd,
            "rapid 74 1980-01 /scratch/m3_riv_pfaf_74_GLDAS_VIC_3H_1980-01_utc.nc4 {unknown}"
        );
    }

    #[test]
    fn origin_renders_empty_initial_state() {
        let invoker = ProcessInvoker::new("run --qinit={initial_state}", "/scratch");
        let cmd = invoker.render(&unit(), &StagedInputs::remote(true));
        assert_eq!(cmd, "run --qinit=''");
    }

    #[test]
    fn values_with_shell_metacharacters_stay_one_word() {
        let vars = unit_vars(&unit(), Path::new("/data/my runs; rm -rf ~"));
        let cmd = render_command("rapid --Qout {output_series}", &vars);
        assert_eq!(
            cmd,
            "rapid --Qout '/data/my runs; rm -rf ~/Qout_pfaf_74_GLDAS_VIC_3H_1980-01_utc.nc'"
        );

        let quoted = render_command("echo {v}", &[("v", "it's".to_string())]);
        assert_eq!(quoted, r"echo 'it'\''s'");
    }

    #[test]
    fn list_placeholders_quote_each_item() {
        let items = vec!["/g/a.nc4".to_string(), "/g/b c.nc4".to_string()];
        let cmd = render_command_with_lists(
            "cat {granules} > {out}",
            &[("out", "/v.nc4".to_string())],
            &[("granules", items)],
        );
        assert_eq!(cmd, "cat /g/a.nc4 '/g/b c.nc4' > /v.nc4");
    }

    #[tokio::test]
    async fn quoted_path_reaches_the_command_intact() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("scratch $HOME `x`");
        tokio::fs::create_dir_all(&scratch).await.unwrap();
        let invoker = ProcessInvoker::new("touch {output_series} {final_state}", &scratch);

        let report = invoker.run(&unit(), &StagedInputs::default()).await.unwrap();

        assert!(report.outputs.iter().all(|o| o.path.exists()));
        assert!(report.outputs.iter().all(|o| o.path.starts_with(&scratch)));
    }

    #[tokio::test]
    async fn successful_run_reports_expected_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = ProcessInvoker::new("touch {output_series} {final_state}", dir.path());

        let report = invoker.run(&unit(), &StagedInputs::default()).await.unwrap();

        assert_eq!(report.outputs.len(), 2);
        assert!(report.outputs.iter().all(|o| o.path.exists()));
        assert_eq!(report.peak_memory_mb, None);
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_compute_error_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let invoker = ProcessInvoker::new("echo boom >&2; exit 3", dir.path());

        let err = invoker.run(&unit(), &StagedInputs::default()).await.unwrap_err();
        match err {
            BatchError::Compute { unit, diagnostic } => {
                assert_eq!(unit, "pfaf_74/GLDAS/VIC/3H/1980-01");
                assert!(diagnostic.contains("exit code 3"));
                assert!(diagnostic.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
