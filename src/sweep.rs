//! The sweep loop: one import call per managed resource instance in state.

use serde::Serialize;
use tabled::Table;
use tabled::settings::Style;

use crate::providers::Provider;
use crate::resource::{ImportStatus, ResourceResult};
use crate::terraform::{ResourceInstanceAddr, ResourceMode, State};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub results: Vec<ResourceResult>,
}

impl SweepReport {
    fn count(&self, status: ImportStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn imported(&self) -> usize {
        self.count(ImportStatus::Imported)
    }

    pub fn failed(&self) -> usize {
        self.count(ImportStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(ImportStatus::Skipped)
    }

    /// Results for instances that were actually sent to the provider.
    pub fn checked(&self) -> impl Iterator<Item = &ResourceResult> {
        self.results
            .iter()
            .filter(|r| r.status != ImportStatus::Skipped)
    }

    pub fn table(&self) -> String {
        let mut table = Table::new(self.checked());
        table.with(Style::sharp());
        table.to_string()
    }

    fn record(
        &mut self,
        addr: &ResourceInstanceAddr,
        id: Option<&str>,
        status: ImportStatus,
        detail: impl Into<String>,
    ) {
        self.results.push(ResourceResult {
            address: addr.to_string(),
            resource_type: addr.type_name().to_string(),
            resource_id: id.unwrap_or_default().to_string(),
            status,
            detail: detail.into(),
        });
    }
}

/// Tries to import every managed resource instance in `state`.
///
/// A failed import is logged and recorded; the sweep carries on with the
/// next instance.
pub async fn sweep(state: &State, provider: &dyn Provider) -> SweepReport {
    let mut report = SweepReport::default();

    for addr in state.resource_instance_addrs() {
        if addr.mode() != ResourceMode::Managed {
            report.record(&addr, None, ImportStatus::Skipped, "data resource");
            continue;
        }

        let Some(current) = state
            .resource_instance(&addr)
            .and_then(|instance| instance.current.as_ref())
        else {
            tracing::debug!(address = %addr, "no current object, skipping");
            report.record(&addr, None, ImportStatus::Skipped, "no current object");
            continue;
        };

        let Some(id) = current.id() else {
            tracing::warn!(address = %addr, "resource has no id, skipping");
            report.record(&addr, None, ImportStatus::Skipped, "no id in state");
            continue;
        };

        let res_type = addr.type_name();
        tracing::info!(id = %id, "{}", addr);

        match provider.import_resource(res_type, &id).await {
            Ok(imported) if imported.is_empty() => {
                tracing::info!(
                    "failed to import resource (type={}, id={}): provider returned no objects",
                    res_type,
                    id
                );
                report.record(
                    &addr,
                    Some(id.as_str()),
                    ImportStatus::Failed,
                    "provider returned no objects",
                );
            }
            Ok(imported) => {
                for r in &imported {
                    tracing::debug!(
                        "imported resource (type={}, id={}): {}",
                        r.type_name,
                        id,
                        r.state
                    );
                }
                report.record(
                    &addr,
                    Some(id.as_str()),
                    ImportStatus::Imported,
                    format!("{} object(s)", imported.len()),
                );
            }
            Err(e) => {
                tracing::info!(
                    error = %e,
                    "failed to import resource (type={}, id={})",
                    res_type,
                    id
                );
                report.record(&addr, Some(id.as_str()), ImportStatus::Failed, e.to_string());
            }
        }
    }

    report
}
