use axonbot_core::config::{AppConfig, LoadOptions};
use axonbot_core::fieldspec::{device_fields_example, user_fields_example};
use axonbot_core::{parse_field_spec, EntityKind, FieldResolver, InventoryClient};
use axonbot_inventory::HttpInventoryClient;
use serde::Serialize;
use tokio::runtime::Runtime;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const FIELD_CHECKS: [(&str, EntityKind); 2] =
    [("device_fields", EntityKind::Device), ("user_fields", EntityKind::User)];

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.extend(inventory_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.push(DoctorCheck::skipped(
                "inventory_connectivity",
                "configuration did not load",
            ));
            for (name, _) in FIELD_CHECKS {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn inventory_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck::fail(
                "inventory_connectivity",
                format!("failed to initialize async runtime: {error}"),
            )];
        }
    };

    let client = match HttpInventoryClient::new(&config.inventory) {
        Ok(client) => client,
        Err(error) => {
            let mut checks = vec![DoctorCheck::fail("inventory_connectivity", error.to_string())];
            for (name, _) in FIELD_CHECKS {
                checks.push(DoctorCheck::skipped(name, "the inventory client could not be built"));
            }
            return checks;
        }
    };

    let connectivity = match runtime.block_on(client.count(EntityKind::Device)) {
        Ok(count) => DoctorCheck::pass(
            "inventory_connectivity",
            format!("reached `{}` ({count} devices)", client.instance_url()),
        ),
        Err(error) => DoctorCheck::fail(
            "inventory_connectivity",
            format!("failed to reach `{}`: {error}", client.instance_url()),
        ),
    };
    let reachable = connectivity.status == CheckStatus::Pass;

    let mut checks = vec![connectivity];
    for (name, kind) in FIELD_CHECKS {
        if reachable {
            checks.push(field_check(&runtime, &client, config, name, kind));
        } else {
            checks.push(DoctorCheck::skipped(name, "the inventory is unreachable"));
        }
    }
    checks
}

fn field_check(
    runtime: &Runtime,
    client: &HttpInventoryClient,
    config: &AppConfig,
    name: &'static str,
    kind: EntityKind,
) -> DoctorCheck {
    let (spec, example) = match kind {
        EntityKind::Device => (&config.inventory.device_fields, device_fields_example()),
        EntityKind::User => (&config.inventory.user_fields, user_fields_example()),
    };

    let requested = match parse_field_spec(spec, &example) {
        Ok(requested) => requested,
        Err(error) => return DoctorCheck::fail(name, error.to_string()),
    };

    match runtime.block_on(FieldResolver::new(client).resolve_selection(kind, &requested)) {
        Ok(resolved) => DoctorCheck::pass(
            name,
            format!("{} {kind} fields resolved", resolved.iter().map(|(_, f)| f.len()).sum::<usize>()),
        ),
        Err(error) => DoctorCheck::fail(name, error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{render_human, CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn human_report_marks_each_check() {
        let report = DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: one or more readiness checks failed".to_string(),
            checks: vec![
                DoctorCheck::pass("config_validation", "ok"),
                DoctorCheck::fail("inventory_connectivity", "refused"),
                DoctorCheck::skipped("device_fields", "the inventory is unreachable"),
            ],
        };

        let rendered = render_human(&report);

        assert!(rendered.contains("- [ok] config_validation: ok"));
        assert!(rendered.contains("- [fail] inventory_connectivity: refused"));
        assert!(rendered
            .contains("- [skip] device_fields: skipped because the inventory is unreachable"));
    }
}
