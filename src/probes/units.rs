/// Service-unit health via `systemctl`
use crate::errors::{DashError, DashResult};
use crate::modules::{CollectContext, Module, Sample};
use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use tokio::process::Command;

pub const UNITS_TOPIC: &str = "units";

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct UnitStatus {
    pub failed_count: usize,
    pub active_count: usize,
    pub total: usize,
    /// Names of failed units, for the dashboard tooltip
    pub failed_units: Vec<String>,
}

/// Count units in `systemctl list-units --all --plain --no-legend` output
///
/// Columns are UNIT LOAD ACTIVE SUB DESCRIPTION. A unit is failed when
/// ACTIVE or SUB says so, and active likewise.
pub fn parse_unit_listing(output: &str) -> UnitStatus {
    let mut status = UnitStatus::default();

    for line in output.lines() {
        let mut fields = line
            .trim_start_matches(|c: char| c == '●' || c == '*' || c.is_whitespace())
            .split_whitespace();
        let (Some(unit), Some(_load), Some(active), Some(sub)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            continue;
        };

        status.total += 1;
        if active == "failed" || sub == "failed" {
            status.failed_count += 1;
            status.failed_units.push(unit.to_string());
        }
        if active == "active" || sub == "active" {
            status.active_count += 1;
        }
    }
    status
}

pub struct UnitsModule {
    systemctl: String,
}

impl UnitsModule {
    pub fn new() -> Self {
        Self {
            systemctl: "systemctl".to_string(),
        }
    }

    async fn run(&self, args: &[&str]) -> DashResult<String> {
        let output = Command::new(&self.systemctl)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(DashError::Collect(format!(
                "{} {} exited with {}: {}",
                self.systemctl,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for UnitsModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for UnitsModule {
    fn name(&self) -> &'static str {
        "Units"
    }

    fn route_root(&self) -> &'static str {
        "units"
    }

    fn topics(&self) -> Vec<&'static str> {
        vec![UNITS_TOPIC]
    }

    async fn should_enable(&self) -> DashResult<bool> {
        match self.run(&["--version"]).await {
            Ok(_) => Ok(true),
            Err(DashError::Io(e)) => Err(DashError::ProbeUnavailable(format!(
                "{} not found: {}",
                self.systemctl, e
            ))),
            Err(e) => Err(e),
        }
    }

    async fn collect(&self, _ctx: &CollectContext) -> DashResult<Vec<Sample>> {
        let listing = self
            .run(&["list-units", "--all", "--plain", "--no-legend", "--no-pager"])
            .await?;
        Ok(vec![Sample::new(UNITS_TOPIC, "overview", parse_unit_listing(&listing))?])
    }
}
