/// A row of the `documents` table.
pub struct DocumentRow {
    pub key: String,
    pub value: String,
    pub revision: i64,
    pub updated_at: String,
}
