use crate::access::value::DataType;

/// A named, typed column in a relation schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub data_type: DataType,
    pub name: String,
}

/// Ordered column descriptor for a relation. Fixed per relation; its total
/// byte width determines how many tuple slots fit on a page.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<(DataType, &str)>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|(data_type, name)| Column {
                    data_type,
                    name: name.to_string(),
                })
                .collect(),
        }
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, i: usize) -> &Column {
        &self.columns[i]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn data_types(&self) -> impl Iterator<Item = DataType> + '_ {
        self.columns.iter().map(|c| c.data_type)
    }

    /// Serialized width of one tuple of this schema, in bytes.
    pub fn tuple_width(&self) -> usize {
        self.columns.iter().map(|c| c.data_type.width()).sum()
    }
}

// Two schemas are interchangeable when their column types match; names do
// not participate.
impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.num_columns() == other.num_columns()
            && self
                .data_types()
                .zip(other.data_types())
                .all(|(a, b)| a == b)
    }
}

impl Eq for Schema {}
