//! Tuple-level access layer: typed values, schemas, tuples, and the
//! sequential scan that query operators consume.

pub mod scan;
pub mod schema;
pub mod tuple;
pub mod value;

pub use scan::SeqScan;
pub use schema::Schema;
pub use tuple::{RecordId, Tuple};
pub use value::{DataType, Value};
