use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc, LazyLock, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;

use super::{RowStore, StoreError, Table};

type Sheets = BTreeMap<String, Vec<Vec<String>>>;

static BOOKS: LazyLock<Mutex<HashMap<String, MemoryBook>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// In-process spreadsheet: named sheets of raw values, header row first.
#[derive(Clone, Default)]
pub struct MemoryBook {
    sheets: Arc<Mutex<Sheets>>,
}

impl MemoryBook {
    /// Process-wide book for `memory://<name>` urls, so repeated opens share sheets.
    pub fn named(name: &str) -> Self {
        let mut books = BOOKS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        books.entry(name.to_string()).or_default().clone()
    }

    pub fn open_or_create(
        &self,
        sheet: &str,
        header: &[String],
    ) -> Result<MemorySheet, StoreError> {
        let mut sheets = self.lock()?;
        sheets
            .entry(sheet.to_string())
            .or_insert_with(|| vec![header.to_vec()]);

        Ok(MemorySheet {
            book: self.clone(),
            sheet: sheet.to_string(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn sheet_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    /// Raw values of a sheet, header row included.
    pub fn values(&self, sheet: &str) -> Result<Vec<Vec<String>>, StoreError> {
        self.lock()?
            .get(sheet)
            .cloned()
            .ok_or_else(|| StoreError::Read(format!("sheet {sheet} not found")))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Sheets>, StoreError> {
        self.sheets
            .lock()
            .map_err(|_| StoreError::Unreachable("memory book lock poisoned".to_string()))
    }
}

pub struct MemorySheet {
    book: MemoryBook,
    sheet: String,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl RowStore for MemorySheet {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn read_all(&self) -> Result<Table, StoreError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StoreError::Read("reads disabled".to_string()));
        }

        self.book.values(&self.sheet).map(Table::from_values)
    }

    async fn append(&self, row: &[String]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Write("writes disabled".to_string()));
        }

        let mut sheets = self.book.lock()?;
        sheets
            .get_mut(&self.sheet)
            .ok_or_else(|| StoreError::Write(format!("sheet {} not found", self.sheet)))?
            .push(row.to_vec());

        Ok(())
    }
}
