use serde::Serialize;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{analyze_sheet, SheetManifest, SheetName, SheetSource, Table};
use crate::logging::{log_sheet_failed, log_sheet_loaded, ProfileScope};

/// All sheets of one load, keyed by sheet. A failed sheet is an empty table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Workbook {
    tables: HashMap<SheetName, Table>,
    pub manifests: Vec<SheetManifest>,
    pub errors: Vec<String>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sheet: SheetName, table: Table) {
        self.tables.insert(sheet, table);
    }

    /// Table for `sheet`, or an empty table when it was not loaded.
    pub fn table(&self, sheet: SheetName) -> &Table {
        static EMPTY: Table = Table { columns: Vec::new(), rows: Vec::new() };
        self.tables.get(&sheet).unwrap_or(&EMPTY)
    }

    /// Online and offline survey responses stacked.
    pub fn survey(&self) -> Table {
        Table::concat(self.table(SheetName::SurveiOnline), self.table(SheetName::SurveiOffline))
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fetches each sheet independently; one failure never aborts the others.
pub async fn load_workbook(source: &dyn SheetSource, sheets: &[SheetName]) -> Workbook {
    let _scope = ProfileScope::new("load_workbook");
    let mut wb = Workbook::new();
    let origin = source.describe();
    for &sheet in sheets {
        match source.fetch_csv(sheet).await {
            Ok(body) => {
                let (table, manifest) = analyze_sheet(sheet, &origin, &body, now_epoch());
                log_sheet_loaded(sheet.as_str(), table.len(), table.columns.len(), &origin);
                wb.manifests.push(manifest);
                wb.insert(sheet, table);
            }
            Err(err) => {
                let msg = format!("{:#}", err);
                log_sheet_failed(sheet.as_str(), &msg);
                wb.errors.push(format!("Gagal load sheet {}: {}", sheet.as_str(), msg));
                wb.insert(sheet, Table::default());
            }
        }
    }
    wb
}
