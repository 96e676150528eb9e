use serde::Serialize;

/// A card as it is stored inside a packaged archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackagedNote {
    pub id: i64,
    pub guid: String,
    pub position: usize,
    pub front: String,
    pub back: String,
    pub tags: Vec<String>,
}
