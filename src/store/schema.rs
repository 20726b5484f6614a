//! Database schema definitions

/// SQL to create the repositories table
///
/// `document` holds the JSON-serialized `RepositoryRecord`; `url` is the
/// lookup key and `language` is duplicated out of the document.
pub const CREATE_REPOSITORIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    url TEXT PRIMARY KEY NOT NULL,
    language TEXT,
    document TEXT NOT NULL
)
"#;

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_REPOSITORIES_TABLE]
}
