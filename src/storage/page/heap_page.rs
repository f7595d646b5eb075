use crate::access::schema::Schema;
use crate::access::tuple::{RecordId, Tuple};
use crate::access::value::Value;
use crate::storage::disk::PAGE_SIZE;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use std::io::Cursor;

/// Number of tuple slots on a page holding tuples of the given schema.
///
/// Each slot costs `tuple_width` bytes plus one presence bit in the header,
/// so `num_slots = floor(PAGE_SIZE * 8 / (tuple_width * 8 + 1))`.
pub fn slots_per_page(schema: &Schema) -> u16 {
    ((PAGE_SIZE * 8) / (schema.tuple_width() * 8 + 1)) as u16
}

/// Size in bytes of the presence bitmap for `num_slots` slots.
pub fn header_size(num_slots: u16) -> usize {
    (num_slots as usize).div_ceil(8)
}

/// A slotted page: a presence bitmap (bit i set, LSB first within each byte,
/// means slot i is occupied) followed by `num_slots` fixed-width tuple slots
/// and zero padding up to `PAGE_SIZE`.
///
/// The page carries its dirty state as the identity of the transaction that
/// last dirtied it (`None` means clean), and keeps an immutable snapshot of
/// the bytes it was deserialized from for rollback-style reads.
pub struct HeapPage {
    pid: PageId,
    schema: Schema,
    header: Vec<u8>,
    tuples: Vec<Option<Tuple>>,
    num_slots: u16,
    dirty: Option<TransactionId>,
    before_image: Box<[u8]>,
}

impl HeapPage {
    /// Deserializes a page from its on-disk bytes. `data` must be exactly
    /// `PAGE_SIZE` bytes; a freshly zeroed buffer yields an empty page.
    pub fn from_bytes(pid: PageId, schema: Schema, data: &[u8]) -> StorageResult<Self> {
        if data.len() != PAGE_SIZE {
            return Err(StorageError::IntegrityViolation(format!(
                "page buffer must be {} bytes, got {}",
                PAGE_SIZE,
                data.len()
            )));
        }

        let num_slots = slots_per_page(&schema);
        let header = data[..header_size(num_slots)].to_vec();

        let mut cursor = Cursor::new(&data[header.len()..]);
        let tuple_width = schema.tuple_width();
        let mut tuples = Vec::with_capacity(num_slots as usize);
        for slot in 0..num_slots {
            if header[slot as usize / 8] & (1 << (slot % 8)) == 0 {
                // Empty slot: skip its fixed-width region.
                cursor.set_position(cursor.position() + tuple_width as u64);
                tuples.push(None);
                continue;
            }
            let values = schema
                .data_types()
                .map(|ty| Value::deserialize(ty, &mut cursor))
                .collect::<StorageResult<Vec<_>>>()?;
            tuples.push(Some(Tuple::with_record_id(RecordId::new(pid, slot), values)));
        }

        Ok(Self {
            pid,
            schema,
            header,
            tuples,
            num_slots,
            dirty: None,
            before_image: data.to_vec().into_boxed_slice(),
        })
    }

    /// Constructs an empty page, as if deserialized from a zeroed buffer.
    pub fn empty(pid: PageId, schema: Schema) -> Self {
        // A zeroed buffer always parses: no presence bit is set.
        Self::from_bytes(pid, schema, &vec![0u8; PAGE_SIZE])
            .expect("zeroed page buffer must deserialize")
    }

    /// Serializes this page to exactly `PAGE_SIZE` bytes: header, then each
    /// slot (field bytes if occupied, zero bytes if not), then zero padding.
    /// `from_bytes(to_bytes(p))` reproduces p's occupied slots and values.
    pub fn to_bytes(&self) -> StorageResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(PAGE_SIZE);
        buf.extend_from_slice(&self.header);

        let tuple_width = self.schema.tuple_width();
        for slot in &self.tuples {
            match slot {
                Some(tuple) => {
                    for value in &tuple.values {
                        value.serialize(&mut buf)?;
                    }
                }
                None => buf.extend(std::iter::repeat(0u8).take(tuple_width)),
            }
        }

        buf.resize(PAGE_SIZE, 0);
        Ok(buf)
    }

    pub fn pid(&self) -> PageId {
        self.pid
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_slots(&self) -> u16 {
        self.num_slots
    }

    pub fn is_slot_used(&self, slot: u16) -> bool {
        self.header[slot as usize / 8] & (1 << (slot % 8)) != 0
    }

    fn mark_slot(&mut self, slot: u16, used: bool) {
        if self.is_slot_used(slot) != used {
            self.header[slot as usize / 8] ^= 1 << (slot % 8);
        }
    }

    pub fn empty_slot_count(&self) -> u16 {
        self.tuples.iter().filter(|t| t.is_none()).count() as u16
    }

    /// Places the tuple in the first free slot and attaches its RecordId.
    pub fn insert_tuple(&mut self, mut tuple: Tuple) -> StorageResult<RecordId> {
        let tuple_schema_matches = tuple.values.len() == self.schema.num_columns()
            && tuple
                .values
                .iter()
                .zip(self.schema.data_types())
                .all(|(v, ty)| v.data_type() == ty);
        if !tuple_schema_matches {
            return Err(StorageError::IntegrityViolation(
                "tuple does not match the page schema".to_string(),
            ));
        }

        let slot = self
            .tuples
            .iter()
            .position(|t| t.is_none())
            .ok_or_else(|| {
                StorageError::IntegrityViolation(format!("page {} is full", self.pid))
            })? as u16;

        let rid = RecordId::new(self.pid, slot);
        tuple.record_id = Some(rid);
        self.mark_slot(slot, true);
        self.tuples[slot as usize] = Some(tuple);
        Ok(rid)
    }

    /// Clears the presence bit and slot named by the tuple's RecordId.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> StorageResult<()> {
        let rid = tuple.record_id.ok_or_else(|| {
            StorageError::IntegrityViolation("tuple has no record id".to_string())
        })?;
        if rid.page_id != self.pid {
            return Err(StorageError::IntegrityViolation(format!(
                "tuple belongs to page {}, not page {}",
                rid.page_id, self.pid
            )));
        }
        if rid.slot >= self.num_slots {
            return Err(StorageError::SlotOutOfRange {
                slot: rid.slot,
                num_slots: self.num_slots,
            });
        }
        if !self.is_slot_used(rid.slot) {
            return Err(StorageError::IntegrityViolation(format!(
                "slot {} of page {} is already empty",
                rid.slot, self.pid
            )));
        }
        self.mark_slot(rid.slot, false);
        self.tuples[rid.slot as usize] = None;
        Ok(())
    }

    /// Iterates over occupied slots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.iter().flatten()
    }

    /// Identity of the transaction that last dirtied this page, or `None`
    /// if the page is clean.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        self.dirty
    }

    pub fn set_dirty(&mut self, tid: TransactionId) {
        self.dirty = Some(tid);
    }

    pub fn set_clean(&mut self) {
        self.dirty = None;
    }

    /// Byte snapshot captured when this page was deserialized.
    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }
}
