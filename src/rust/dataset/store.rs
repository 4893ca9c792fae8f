use std::path::Path;

use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::{Dataset, DatasetError, LabeledMessage, METADATA_COLUMNS};

/// Table holding the cleaned dataset.
pub const TABLE_NAME: &str = "dataset";

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool, DatasetError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create);
    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?)
}

/// Writes `dataset` to the SQLite file at `path`, creating the file if
/// needed and replacing any existing `dataset` table. The replacement
/// happens in one transaction.
pub async fn save_data<P: AsRef<Path>>(dataset: &Dataset, path: P) -> Result<(), DatasetError> {
    let path = path.as_ref();
    let pool = connect(path, true).await?;

    let category_columns: Vec<String> = dataset
        .category_names()
        .iter()
        .map(|name| quote_identifier(name))
        .collect();

    let mut create = format!(
        "CREATE TABLE {TABLE_NAME} (id INTEGER, message TEXT, original TEXT, genre TEXT"
    );
    for column in &category_columns {
        create.push_str(&format!(", {column} INTEGER"));
    }
    create.push(')');

    let mut insert = format!("INSERT INTO {TABLE_NAME} (id, message, original, genre");
    for column in &category_columns {
        insert.push_str(&format!(", {column}"));
    }
    insert.push_str(") VALUES (?, ?, ?, ?");
    insert.push_str(&", ?".repeat(category_columns.len()));
    insert.push(')');

    let mut tx = pool.begin().await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {TABLE_NAME}"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&create).execute(&mut *tx).await?;

    for record in dataset.records() {
        let mut query = sqlx::query(&insert)
            .bind(record.id)
            .bind(&record.message)
            .bind(&record.original)
            .bind(&record.genre);
        for &label in &record.labels {
            query = query.bind(i64::from(label));
        }
        query.execute(&mut *tx).await?;
    }
    tx.commit().await?;
    pool.close().await;

    info!(
        "Saved {} records with {} categories to {:?}",
        dataset.len(),
        dataset.category_names().len(),
        path
    );
    Ok(())
}

/// Reads the `dataset` table written by [`save_data`]. Every column other
/// than `id, message, original, genre` is taken as a category, in table
/// order.
pub async fn load_dataset<P: AsRef<Path>>(path: P) -> Result<Dataset, DatasetError> {
    let path = path.as_ref();
    let pool = connect(path, false).await?;

    let columns: Vec<String> = sqlx::query(&format!("PRAGMA table_info({TABLE_NAME})"))
        .fetch_all(&pool)
        .await?
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<Result<_, _>>()?;
    if columns.is_empty() {
        pool.close().await;
        return Err(DatasetError::MissingColumn(format!(
            "table '{TABLE_NAME}' does not exist"
        )));
    }
    if let Some(missing) = METADATA_COLUMNS
        .iter()
        .find(|required| !columns.iter().any(|c| c == *required))
    {
        pool.close().await;
        return Err(DatasetError::MissingColumn(missing.to_string()));
    }

    let category_names: Vec<String> = columns
        .into_iter()
        .filter(|c| !METADATA_COLUMNS.contains(&c.as_str()))
        .collect();

    let mut select = String::from("SELECT id, message, original, genre");
    for name in &category_names {
        select.push_str(", ");
        select.push_str(&quote_identifier(name));
    }
    select.push_str(&format!(" FROM {TABLE_NAME} ORDER BY rowid"));

    let rows = sqlx::query(&select).fetch_all(&pool).await?;
    pool.close().await;

    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let mut labels = Vec::with_capacity(category_names.len());
        for (j, name) in category_names.iter().enumerate() {
            let value: i64 = row.try_get(METADATA_COLUMNS.len() + j)?;
            let label = u8::try_from(value)
                .ok()
                .filter(|&v| v <= 1)
                .ok_or_else(|| DatasetError::NonBinaryLabel {
                    row: i,
                    category: name.clone(),
                    value,
                })?;
            labels.push(label);
        }
        records.push(LabeledMessage {
            id: row.try_get(0)?,
            message: row.try_get(1)?,
            original: row.try_get(2)?,
            genre: row.try_get(3)?,
            labels,
        });
    }
    info!(
        "Loaded {} records with {} categories from {:?}",
        records.len(),
        category_names.len(),
        path
    );

    Dataset::new(category_names, records)
}
