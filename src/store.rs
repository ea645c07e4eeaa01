//! Append-only snippet store plus the project/document rows it hangs off.
//!
//! The snippet table is the authoritative record for raw spans and vectors;
//! the persisted index (`index` module) is a disposable cache derived from
//! it. Snippets are never updated in place: they are appended on ingest and
//! removed only by deleting their owning document.

use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{Document, Project, Span, StoredSnippet};

// ============ Projects ============

pub async fn create_project(pool: &SqlitePool, name: &str) -> Result<Project> {
    let project = Project {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        created_at: chrono::Utc::now().timestamp(),
    };

    sqlx::query("INSERT INTO projects (id, name, created_at) VALUES (?, ?, ?)")
        .bind(&project.id)
        .bind(&project.name)
        .bind(project.created_at)
        .execute(pool)
        .await?;

    Ok(project)
}

pub async fn get_project(pool: &SqlitePool, project_id: &str) -> Result<Project> {
    let row = sqlx::query("SELECT id, name, created_at FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::ProjectNotFound(project_id.to_string()))?;

    Ok(Project {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    })
}

pub async fn list_projects(pool: &SqlitePool) -> Result<Vec<Project>> {
    let rows = sqlx::query("SELECT id, name, created_at FROM projects ORDER BY created_at, id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| Project {
            id: row.get("id"),
            name: row.get("name"),
            created_at: row.get("created_at"),
        })
        .collect())
}

pub async fn rename_project(pool: &SqlitePool, project_id: &str, name: &str) -> Result<()> {
    let result = sqlx::query("UPDATE projects SET name = ? WHERE id = ?")
        .bind(name)
        .bind(project_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::ProjectNotFound(project_id.to_string()));
    }
    Ok(())
}

/// Delete a project row; documents and snippets cascade.
pub async fn delete_project(pool: &SqlitePool, project_id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(project_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::ProjectNotFound(project_id.to_string()));
    }
    Ok(())
}

// ============ Documents ============

pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Insert a document row. Generic over the executor so the engine can run
/// it inside the same transaction as the snippet appends.
pub async fn insert_document<'e, E>(
    executor: E,
    project_id: &str,
    name: &str,
    body: &str,
) -> Result<Document>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let document = Document {
        id: Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        name: name.to_string(),
        content_hash: content_hash(body),
        body: body.to_string(),
        created_at: chrono::Utc::now().timestamp(),
    };

    sqlx::query(
        "INSERT INTO documents (id, project_id, name, content_hash, body, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&document.id)
    .bind(&document.project_id)
    .bind(&document.name)
    .bind(&document.content_hash)
    .bind(&document.body)
    .bind(document.created_at)
    .execute(executor)
    .await?;

    Ok(document)
}

pub async fn get_document(pool: &SqlitePool, document_id: &str) -> Result<Document> {
    let row = sqlx::query(
        "SELECT id, project_id, name, content_hash, body, created_at FROM documents WHERE id = ?",
    )
    .bind(document_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| Error::DocumentNotFound(document_id.to_string()))?;

    Ok(row_to_document(&row))
}

pub async fn list_documents(pool: &SqlitePool, project_id: &str) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        "SELECT id, project_id, name, content_hash, body, created_at FROM documents WHERE project_id = ? ORDER BY created_at, id",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_document).collect())
}

/// Look up an existing document in the project with the same extracted body.
/// Used to skip idempotent re-uploads.
pub async fn find_document_by_hash(
    pool: &SqlitePool,
    project_id: &str,
    hash: &str,
) -> Result<Option<String>> {
    let id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM documents WHERE project_id = ? AND content_hash = ? LIMIT 1",
    )
    .bind(project_id)
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    Ok(id)
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        content_hash: row.get("content_hash"),
        body: row.get("body"),
        created_at: row.get("created_at"),
    }
}

// ============ Snippets ============

/// Append one snippet. Monotonic: existing rows are never overwritten, and
/// `created_order` strictly increases across the whole database. Generic
/// over the executor for the same reason as [`insert_document`].
pub async fn append_snippet<'e, E>(
    executor: E,
    document_id: &str,
    span: Span,
    vector: Option<&[f32]>,
) -> Result<String>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let snippet_id = Uuid::new_v4().to_string();
    let blob = vector.map(vec_to_blob);

    sqlx::query(
        r#"
        INSERT INTO snippets (id, document_id, start_char, end_char, embedding, created_order)
        VALUES (?, ?, ?, ?, ?, (SELECT IFNULL(MAX(created_order), 0) + 1 FROM snippets))
        "#,
    )
    .bind(&snippet_id)
    .bind(document_id)
    .bind(span.start as i64)
    .bind(span.end as i64)
    .bind(blob)
    .execute(executor)
    .await?;

    Ok(snippet_id)
}

/// All snippets in a project, in creation order.
pub async fn list_by_project(pool: &SqlitePool, project_id: &str) -> Result<Vec<StoredSnippet>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.document_id, s.start_char, s.end_char, s.embedding, s.created_order
        FROM snippets s
        JOIN documents d ON d.id = s.document_id
        WHERE d.project_id = ?
        ORDER BY s.created_order
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_snippet).collect())
}

pub async fn list_by_document(pool: &SqlitePool, document_id: &str) -> Result<Vec<StoredSnippet>> {
    let rows = sqlx::query(
        r#"
        SELECT id, document_id, start_char, end_char, embedding, created_order
        FROM snippets
        WHERE document_id = ?
        ORDER BY created_order
        "#,
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_snippet).collect())
}

fn row_to_snippet(row: &sqlx::sqlite::SqliteRow) -> StoredSnippet {
    let start: i64 = row.get("start_char");
    let end: i64 = row.get("end_char");
    let blob: Option<Vec<u8>> = row.get("embedding");

    StoredSnippet {
        id: row.get("id"),
        document_id: row.get("document_id"),
        span: Span::new(start as usize, end as usize),
        vector: blob.map(|b| blob_to_vec(&b)),
        created_order: row.get("created_order"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn test_pool() -> (tempfile::TempDir, SqlitePool) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.sqlite");
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .unwrap()
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, pool)
    }

    #[tokio::test]
    async fn append_and_list_preserve_creation_order() {
        let (_tmp, pool) = test_pool().await;
        let project = create_project(&pool, "p").await.unwrap();
        let doc = insert_document(&pool, &project.id, "d", "hello world").await.unwrap();

        let v = vec![1.0f32, 0.0];
        append_snippet(&pool, &doc.id, Span::new(0, 5), Some(&v)).await.unwrap();
        append_snippet(&pool, &doc.id, Span::new(3, 11), None).await.unwrap();
        append_snippet(&pool, &doc.id, Span::new(6, 11), Some(&v)).await.unwrap();

        let snippets = list_by_project(&pool, &project.id).await.unwrap();
        assert_eq!(snippets.len(), 3);
        assert!(snippets.windows(2).all(|w| w[0].created_order < w[1].created_order));
        assert_eq!(snippets[0].span, Span::new(0, 5));
        assert_eq!(snippets[0].vector.as_deref(), Some(&v[..]));
        assert!(snippets[1].vector.is_none());
    }

    #[tokio::test]
    async fn listing_is_scoped_per_project() {
        let (_tmp, pool) = test_pool().await;
        let p1 = create_project(&pool, "one").await.unwrap();
        let p2 = create_project(&pool, "two").await.unwrap();
        let d1 = insert_document(&pool, &p1.id, "d1", "aaa").await.unwrap();
        let d2 = insert_document(&pool, &p2.id, "d2", "bbb").await.unwrap();

        append_snippet(&pool, &d1.id, Span::new(0, 3), None).await.unwrap();
        append_snippet(&pool, &d2.id, Span::new(0, 3), None).await.unwrap();

        let s1 = list_by_project(&pool, &p1.id).await.unwrap();
        assert_eq!(s1.len(), 1);
        assert_eq!(s1[0].document_id, d1.id);
    }

    #[tokio::test]
    async fn list_by_document_is_scoped_and_ordered() {
        let (_tmp, pool) = test_pool().await;
        let project = create_project(&pool, "p").await.unwrap();
        let doc = insert_document(&pool, &project.id, "d", "some body text").await.unwrap();
        let other = insert_document(&pool, &project.id, "e", "other body").await.unwrap();
        append_snippet(&pool, &doc.id, Span::new(0, 4), None).await.unwrap();
        append_snippet(&pool, &other.id, Span::new(0, 5), None).await.unwrap();
        append_snippet(&pool, &doc.id, Span::new(4, 14), None).await.unwrap();

        let snippets = list_by_document(&pool, &doc.id).await.unwrap();
        assert_eq!(snippets.len(), 2);
        assert!(snippets[0].created_order < snippets[1].created_order);
        assert!(snippets.iter().all(|s| s.document_id == doc.id));
    }

    #[tokio::test]
    async fn uncommitted_document_writes_roll_back_together() {
        let (_tmp, pool) = test_pool().await;
        let project = create_project(&pool, "p").await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let doc = insert_document(&mut *tx, &project.id, "d", "hello world")
            .await
            .unwrap();
        append_snippet(&mut *tx, &doc.id, Span::new(0, 5), None).await.unwrap();
        drop(tx);

        // Rollback: neither the document row nor a partial snippet set
        // survives.
        assert!(get_document(&pool, &doc.id).await.is_err());
        assert!(list_by_project(&pool, &project.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn identical_bodies_share_a_content_hash() {
        let (_tmp, pool) = test_pool().await;
        let project = create_project(&pool, "p").await.unwrap();
        let doc = insert_document(&pool, &project.id, "d", "same text").await.unwrap();

        let found = find_document_by_hash(&pool, &project.id, &content_hash("same text"))
            .await
            .unwrap();
        assert_eq!(found, Some(doc.id));
        let missing = find_document_by_hash(&pool, &project.id, &content_hash("other text"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn project_delete_cascades_to_documents_and_snippets() {
        let (_tmp, pool) = test_pool().await;
        let project = create_project(&pool, "p").await.unwrap();
        let doc = insert_document(&pool, &project.id, "d", "body").await.unwrap();
        append_snippet(&pool, &doc.id, Span::new(0, 4), None).await.unwrap();

        delete_project(&pool, &project.id).await.unwrap();

        assert!(get_document(&pool, &doc.id).await.is_err());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM snippets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
