use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use super::{Dataset, DatasetError, LabeledMessage};

/// A message joined with its raw `categories` string, before cleaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: i64,
    pub message: String,
    pub original: Option<String>,
    pub genre: String,
    /// `name-value` items separated by `;`.
    pub categories: String,
}

#[derive(Debug, Deserialize)]
struct MessageRow {
    id: i64,
    message: String,
    original: Option<String>,
    genre: String,
}

#[derive(Debug, Deserialize)]
struct CategoryRow {
    id: i64,
    categories: String,
}

fn require_columns<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    required: &[&str],
) -> Result<(), DatasetError> {
    let headers = reader.headers()?;
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(DatasetError::MissingColumn(column.to_string()));
        }
    }
    Ok(())
}

/// Reads the messages and categories CSV files and joins them on `id`.
///
/// Every matching pair is produced, in messages-file order and then
/// categories-file order; messages without categories are dropped.
pub fn load_data<P: AsRef<Path>, Q: AsRef<Path>>(
    messages_path: P,
    categories_path: Q,
) -> Result<Vec<RawRecord>, DatasetError> {
    let mut reader = csv::Reader::from_path(messages_path.as_ref())?;
    require_columns(&mut reader, &["id", "message", "original", "genre"])?;
    let messages = reader
        .deserialize()
        .collect::<Result<Vec<MessageRow>, csv::Error>>()?;

    let mut reader = csv::Reader::from_path(categories_path.as_ref())?;
    require_columns(&mut reader, &["id", "categories"])?;
    let mut categories: HashMap<i64, Vec<String>> = HashMap::new();
    let mut n_categories = 0;
    for row in reader.deserialize() {
        let row: CategoryRow = row?;
        categories.entry(row.id).or_default().push(row.categories);
        n_categories += 1;
    }
    info!(
        "Read {} messages and {} category rows",
        messages.len(),
        n_categories
    );

    let mut records = Vec::with_capacity(messages.len());
    for message in messages {
        let Some(matches) = categories.get(&message.id) else {
            continue;
        };
        for category in matches {
            records.push(RawRecord {
                id: message.id,
                message: message.message.clone(),
                original: message.original.clone(),
                genre: message.genre.clone(),
                categories: category.clone(),
            });
        }
    }
    info!("Merged into {} records", records.len());
    Ok(records)
}

fn parse_categories(row: usize, raw: &str) -> Result<Vec<(String, i64)>, DatasetError> {
    raw.split(';')
        .map(|item| {
            let malformed = || DatasetError::MalformedCategory {
                row,
                value: item.to_string(),
            };
            let (name, value) = item.split_once('-').ok_or_else(malformed)?;
            let value = value.trim().parse::<i64>().map_err(|_| malformed())?;
            let name = name.trim();
            if name.is_empty() {
                return Err(malformed());
            }
            Ok((name.to_string(), value))
        })
        .collect()
}

/// Splits the `categories` strings into one binary column per category and
/// drops exact duplicate rows, keeping the first.
///
/// Category names come from the first record; every other record must list
/// the same names in the same order. Values other than 0 and 1 are an error
/// unless `binarize` is set, in which case any non-zero value becomes 1.
pub fn clean_data(records: Vec<RawRecord>, binarize: bool) -> Result<Dataset, DatasetError> {
    let Some(first) = records.first() else {
        return Err(DatasetError::EmptyDataset);
    };
    let category_names: Vec<String> = parse_categories(0, &first.categories)?
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    let total = records.len();
    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(total);
    let mut binarized = 0usize;
    for (row, record) in records.into_iter().enumerate() {
        let parsed = parse_categories(row, &record.categories)?;
        if parsed.len() != category_names.len() {
            return Err(DatasetError::InconsistentCategories {
                row,
                detail: format!(
                    "expected {} categories, found {}",
                    category_names.len(),
                    parsed.len()
                ),
            });
        }

        let mut labels = Vec::with_capacity(parsed.len());
        for ((name, value), expected) in parsed.into_iter().zip(&category_names) {
            if &name != expected {
                return Err(DatasetError::InconsistentCategories {
                    row,
                    detail: format!("expected category '{expected}', found '{name}'"),
                });
            }
            let label = match value {
                0 | 1 => value as u8,
                _ if binarize => {
                    binarized += 1;
                    u8::from(value != 0)
                }
                _ => {
                    return Err(DatasetError::NonBinaryLabel {
                        row,
                        category: name,
                        value,
                    })
                }
            };
            labels.push(label);
        }

        let message = LabeledMessage {
            id: record.id,
            message: record.message,
            original: record.original,
            genre: record.genre,
            labels,
        };
        if seen.insert(message.clone()) {
            cleaned.push(message);
        }
    }

    if cleaned.len() < total {
        info!("Dropped {} duplicate records", total - cleaned.len());
    }
    if binarized > 0 {
        warn!("Binarized {} non-binary category values", binarized);
    }
    info!(
        "Cleaned {} records with {} categories",
        cleaned.len(),
        category_names.len()
    );
    Dataset::new(category_names, cleaned)
}
