use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::macros::format_description;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

/// Everything a finished session reports. Created once per completed
/// session, persisted, never mutated afterward.
#[derive(Debug, Clone)]
pub struct ProductionReport {
    pub item_code: String,
    pub product_name: String,
    pub demand: String,
    pub produced: u64,
    pub temperature: String,
    pub baskets: String,
    pub line_number: u32,
    pub staff: String,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub duration: Duration,
    /// Set when the loop did not acknowledge cancellation before the stop
    /// timeout, so the count snapshot may not be final.
    pub incomplete: bool,
}

impl ProductionReport {
    pub fn total_man_hours(&self) -> f64 {
        staff_count(&self.staff) * self.duration.as_seconds_f64() / 3600.0
    }

    /// Seconds per produced item; undefined (rendered "-") for zero output.
    pub fn avg_preparation_time(&self) -> Option<f64> {
        if self.produced > 0 {
            Some(self.duration.as_seconds_f64() / self.produced as f64)
        } else {
            None
        }
    }

    /// Deterministic human-readable rendering, same content that gets
    /// persisted and handed back for display.
    pub fn render(&self) -> String {
        let avg = match self.avg_preparation_time() {
            Some(v) => format!("{:.2}", v),
            None => "-".to_string(),
        };
        let clock = format_description!("[hour]:[minute]:[second]");
        let start = self.start.format(&clock).unwrap_or_default();
        let end = self.end.format(&clock).unwrap_or_default();

        let mut out = format!(
            "Production Summary\n\
             \n\
             Product ID: {}\n\
             Product Name: {}\n\
             Demand: {}\n\
             Produced: {}\n\
             Temperature: {}\n\
             Total Baskets: {}\n\
             Line Number: {}\n\
             Number of Staff: {}\n\
             Total Manhour: {:.2}\n\
             Avg. Preparation Time: {} seconds\n\
             \n\
             Time Start: {}\n\
             Time End: {}\n\
             Duration: {}\n",
            self.item_code,
            self.product_name,
            self.demand,
            self.produced,
            self.temperature,
            self.baskets,
            self.line_number,
            self.staff,
            self.total_man_hours(),
            avg,
            start,
            end,
            fmt_duration(self.duration),
        );
        if self.incomplete {
            out.push_str("\nINCOMPLETE: processing loop did not stop in time; count may be stale\n");
        }
        out
    }

    /// Persist under `report/Date_<DATE>/Report_<ITEM>_<PRODUCT>_<LINE>_<START>_to_<END>.txt`
    /// and return the rendered content for display.
    pub fn save(&self, root: &str) -> Result<(PathBuf, String)> {
        let path = self.output_path(root);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).context("create report dir")?;
        }
        let content = self.render();
        std::fs::write(&path, &content).with_context(|| format!("write report {}", path.display()))?;
        info!("report: saved {}", path.display());
        Ok((path, content))
    }

    pub fn output_path(&self, root: &str) -> PathBuf {
        let day = format_description!("[day][month repr:short][year]");
        let date = self.start.format(&day).unwrap_or_else(|_| "UNDATED".into()).to_uppercase();
        let clock = format_description!("[hour]-[minute]-[second]");
        let start = self.start.format(&clock).unwrap_or_default();
        let end = self.end.format(&clock).unwrap_or_default();

        // product selector comes in as "id: name"; the filename wants the name
        let product = self
            .product_name
            .split_once(':')
            .map(|(_, name)| name.trim())
            .unwrap_or(self.product_name.as_str());

        Path::new(root).join(format!("Date_{}", date)).join(format!(
            "Report_{}_{}_{}_{}_to_{}.txt",
            self.item_code, product, self.line_number, start, end
        ))
    }
}

fn staff_count(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(n) if n >= 0.0 => n,
        _ => {
            warn!("report: staff value {:?} is not a number, man-hours set to 0", raw);
            0.0
        }
    }
}

fn fmt_duration(d: Duration) -> String {
    let total = d.whole_seconds().max(0);
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
