use crate::access::value::Value;
use crate::storage::page::PageId;
use std::cmp::Ordering;

/// Location of a stored tuple: the page holding it plus its slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u16,
}

impl RecordId {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.page_id.table_id, self.page_id.page_no, self.slot).cmp(&(
            other.page_id.table_id,
            other.page_id.page_no,
            other.slot,
        ))
    }
}

/// A row of field values. `record_id` is attached once the tuple is stored
/// on a page and is required to delete it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub record_id: Option<RecordId>,
    pub values: Vec<Value>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            record_id: None,
            values,
        }
    }

    pub fn with_record_id(record_id: RecordId, values: Vec<Value>) -> Self {
        Self {
            record_id: Some(record_id),
            values,
        }
    }
}
