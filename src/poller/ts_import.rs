//! Time-series import from relational value queries.
//!
//! A relational template's query selects `file` and `val` columns. Rows
//! are read page by page; each value is scaled by the template rate and
//! written to `{template path}/{file}`.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::context::RunContext;
use crate::inventory::Template;
use crate::normalize::Normalizer;
use crate::poller::{DevicePoller, PollError, PollSummary, record_point};
use crate::storage::{Row, RowSource, SqlArg, StorageError};

/// One `LIMIT/OFFSET` window over a value query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportPage {
    pub offset: usize,
    pub size: usize,
}

impl ImportPage {
    pub fn first(size: usize) -> Self {
        Self {
            offset: 0,
            size: size.max(1),
        }
    }

    pub fn next(self) -> Self {
        Self {
            offset: self.offset + self.size,
            size: self.size,
        }
    }

    /// A page shorter than the window ends the query.
    pub fn is_last(&self, rows: usize) -> bool {
        rows < self.size
    }

    pub fn fetch(&self, source: &dyn RowSource, query: &str) -> Result<Vec<Row>, StorageError> {
        let sql = format!(
            "{} LIMIT ? OFFSET ?",
            query.trim().trim_end_matches(';')
        );
        source.select_rows(
            &sql,
            &[SqlArg::Int(self.size as i64), SqlArg::Int(self.offset as i64)],
        )
    }
}

/// File names come from the database; keep them inside the template
/// directory.
fn valid_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

pub struct TsImportPoller {
    ctx: RunContext,
    normalizer: Normalizer,
}

impl TsImportPoller {
    pub fn new(ctx: RunContext) -> Self {
        Self {
            ctx,
            normalizer: Normalizer::new(),
        }
    }

    fn import_row(&self, template: &Template, row: &Row, summary: &mut PollSummary) {
        let Some(file) = row.get("file").map(|f| f.trim()).filter(|f| valid_file_name(f)) else {
            summary.dropped += 1;
            tracing::warn!(
                template = %template.path,
                file = ?row.get("file"),
                "Bad file name in value row"
            );
            return;
        };
        let Some(raw) = row.get("val") else {
            summary.dropped += 1;
            tracing::debug!(template = %template.path, file, "Value row without value");
            return;
        };
        let parsed = Decimal::from_str(raw.trim())
            .or_else(|_| Decimal::from_scientific(raw.trim()));
        let raw = match parsed {
            Ok(raw) => raw,
            Err(e) => {
                summary.dropped += 1;
                tracing::warn!(
                    template = %template.path,
                    file,
                    value = %raw,
                    error = %e,
                    "Value is not a number"
                );
                return;
            }
        };
        let Some(value) = self.normalizer.normalize(raw, template.rate) else {
            summary.dropped += 1;
            return;
        };

        let path = self.ctx.sink.file_path(&template.path, file);
        record_point(&self.ctx, &path, &template.ts_config(), &[Some(value)], summary);
    }
}

#[async_trait::async_trait]
impl DevicePoller for TsImportPoller {
    type Device = Template;

    fn name(&self) -> &str {
        "ts-import"
    }

    fn describe(&self, template: &Template) -> String {
        template.path.clone()
    }

    async fn poll(&self, template: Template) -> Result<PollSummary, PollError> {
        let mut summary = PollSummary::default();
        let mut page = ImportPage::first(self.ctx.settings.timeseries.page_size);

        loop {
            let rows = page.fetch(self.ctx.rows.as_ref(), &template.query)?;
            for row in &rows {
                self.import_row(&template, row, &mut summary);
            }
            tracing::debug!(
                template = %template.path,
                offset = page.offset,
                rows = rows.len(),
                "Value page imported"
            );

            if page.is_last(rows.len()) {
                break;
            }
            page = page.next();
            tokio::task::yield_now().await;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::poller::testing::TestBed;
    use crate::storage::DataSourceKind;

    const SEED: &[&str] = &[
        "CREATE TABLE port_traffic (port VARCHAR, octets DOUBLE)",
        "INSERT INTO port_traffic VALUES \
         ('sw1-p1', 1.5), ('sw1-p2', 2.25), ('sw1-p3', 10), ('sw1-p4', 0.3), \
         ('sw1-p5', NULL), ('../escape', 4)",
    ];

    fn template(query: &str) -> Template {
        Template {
            path: "billing/traffic".into(),
            query: query.into(),
            rate: Decimal::from(8),
            counter: DataSourceKind::Gauge,
            min: Some(0.0),
            max: None,
            step: 300,
            threshold: None,
        }
    }

    fn settings(page_size: usize) -> AppConfig {
        let mut settings = AppConfig::default();
        settings.timeseries.page_size = page_size;
        settings
    }

    #[test]
    fn test_page_windows() {
        let page = ImportPage::first(0);
        assert_eq!(page.size, 1);

        let page = ImportPage::first(500).next().next();
        assert_eq!(page.offset, 1000);
        assert!(page.is_last(499));
        assert!(!page.is_last(500));
    }

    #[test]
    fn test_file_names() {
        assert!(valid_file_name("sw1-p1"));
        assert!(valid_file_name("0000000042"));
        assert!(!valid_file_name(""));
        assert!(!valid_file_name(".."));
        assert!(!valid_file_name("a/b"));
    }

    #[tokio::test]
    async fn test_import_pages_through_query() {
        let bed = TestBed::with_settings(SEED, settings(2));
        let poller = TsImportPoller::new(bed.ctx.clone());

        let summary = poller
            .poll(template(
                "SELECT port AS file, octets AS val FROM port_traffic ORDER BY port;",
            ))
            .await
            .unwrap();
        assert_eq!(summary.samples, 4);
        assert_eq!(summary.dropped, 2);

        let updates = |file: &str| bed.ts.updates(&bed.ts_path(&format!("billing/traffic/{file}")));
        assert_eq!(updates("sw1-p1"), vec![vec![Some(Decimal::from(12))]]);
        assert_eq!(updates("sw1-p2"), vec![vec![Some(Decimal::from(18))]]);
        assert_eq!(updates("sw1-p3"), vec![vec![Some(Decimal::from(80))]]);
        assert_eq!(updates("sw1-p4"), vec![vec![Some(Decimal::from(2))]]);
        assert_eq!(bed.ts.paths().len(), 4);

        let config = bed.ts.config(&bed.ts_path("billing/traffic/sw1-p1")).unwrap();
        assert_eq!(config.data_sources[0].name, "val");

        drop(poller);
        bed.finish();
    }

    #[tokio::test]
    async fn test_exact_page_multiple_reads_empty_tail() {
        let bed = TestBed::with_settings(SEED, settings(3));
        let poller = TsImportPoller::new(bed.ctx.clone());

        let summary = poller
            .poll(template("SELECT port AS file, octets AS val FROM port_traffic ORDER BY port"))
            .await
            .unwrap();
        assert_eq!(summary.samples + summary.dropped, 6);

        drop(poller);
        bed.finish();
    }

    #[tokio::test]
    async fn test_broken_query_fails_template() {
        let bed = TestBed::new(SEED);
        let poller = TsImportPoller::new(bed.ctx.clone());

        let err = poller
            .poll(template("SELECT file, val FROM missing_table"))
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Storage(_)), "{err}");
        assert!(bed.ts.paths().is_empty());

        drop(poller);
        bed.finish();
    }
}
