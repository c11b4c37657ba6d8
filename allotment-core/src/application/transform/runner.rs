// allotment-core/src/application/transform/runner.rs

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::staging::StagingStore;
use crate::application::transform::{TransformUnit, UnitContext};
use crate::domain::conversion::Converter;
use crate::domain::migration::{SkipReason, UnitCounters};
use crate::error::AllotmentError;

const MAX_REPORTED_REJECTIONS: usize = 5;

/// Result of paging once through a unit's staged rows.
#[derive(Debug, Clone, Default)]
pub struct UnitRun {
    pub counters: UnitCounters,
    pub cancelled: bool,
    /// First rejections, `source_id: reason`, for the run-log message.
    pub rejections: Vec<String>,
}

impl UnitRun {
    pub fn summary(&self) -> Option<String> {
        if self.counters.failed == 0 && self.counters.field_issues == 0 && !self.cancelled {
            return None;
        }
        let mut parts = Vec::new();
        if self.counters.failed > 0 {
            parts.push(format!(
                "{} row(s) rejected; first: {}",
                self.counters.failed,
                self.rejections.join(" | ")
            ));
        }
        if self.counters.field_issues > 0 {
            parts.push(format!(
                "{} field value(s) nulled by conversion",
                self.counters.field_issues
            ));
        }
        if self.cancelled {
            parts.push(format!("cancelled after {} page(s)", self.counters.pages));
        }
        Some(parts.join("; "))
    }
}

/// Pages sequentially through the batch's staged rows of the unit's entity.
///
/// A rejected row is counted and the page goes on. Cancellation is checked
/// before each page, so an in-flight page always completes. A multi-row page
/// in which every store write failed points at the store rather than the
/// data and fails the unit.
pub async fn run_pages(
    unit: &dyn TransformUnit,
    ctx: &UnitContext,
    staging: &StagingStore,
    page_size: usize,
    cancel: &CancellationToken,
) -> Result<UnitRun, AllotmentError> {
    let entity = unit.entity();
    let id_column = entity.source_id_column();
    let page_size = page_size.max(1);
    let mut run = UnitRun::default();
    let mut offset: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            run.cancelled = true;
            break;
        }

        let rows = staging
            .read_page(entity, ctx.batch_id, offset, page_size)
            .await?;
        if rows.is_empty() {
            break;
        }
        offset += rows.len() as u64;
        run.counters.pages += 1;

        let mut store_failures = 0usize;
        let mut last_store_error = None;

        for row in &rows {
            let source_id = row.text(id_column).unwrap_or_else(|| "<none>".to_string());
            let mut conv = Converter::new();

            let outcome = match unit.transform(row, &mut conv, ctx).await? {
                Ok(upsert) => {
                    let (sql, params) = upsert.to_sql(ctx.now);
                    match ctx.connector.execute_with(&sql, &params).await {
                        Ok(_) => Ok(()),
                        Err(e) => {
                            store_failures += 1;
                            last_store_error = Some(e.to_string());
                            Err(SkipReason::Store {
                                message: e.to_string(),
                            })
                        }
                    }
                }
                Err(reason) => Err(reason),
            };

            match outcome {
                Ok(()) => {
                    for issue in conv.issues() {
                        debug!(entity = %entity, source_id = %source_id, "Field nulled: {}", issue);
                    }
                    run.counters.record_success(conv.issues().len());
                }
                Err(reason) => {
                    warn!(entity = %entity, source_id = %source_id, "Row rejected: {}", reason);
                    if run.rejections.len() < MAX_REPORTED_REJECTIONS {
                        run.rejections.push(format!("{}: {}", source_id, reason));
                    }
                    run.counters.record_skip();
                }
            }
        }

        if rows.len() > 1 && store_failures == rows.len() {
            return Err(AllotmentError::InternalError(format!(
                "{}: every write of page {} failed: {}",
                entity,
                run.counters.pages,
                last_store_error.unwrap_or_default()
            )));
        }

        if rows.len() < page_size {
            break;
        }
    }

    Ok(run)
}
