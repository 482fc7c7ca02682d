use chrono::{DateTime, Utc};
use libsql::{Builder, Database};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::diagnosis::Diagnosis;
use crate::{Error, Result};

use super::types::{AnalysisUpdate, Comment, Post, SavedAnalysis};

/// Persistence gateway for finished analyses and the community feed.
///
/// Backed by libsql. When the configured path cannot be opened the store
/// falls back to an in-memory database so the service keeps answering, at
/// the cost of durability.
pub struct Store {
    db: Database,
}

impl Store {
    pub async fn new(db_path: &str) -> Result<Self> {
        let db = match Builder::new_local(db_path).build().await {
            Ok(db) => {
                info!("database opened: {}", db_path);
                db
            }
            Err(err) => {
                warn!(
                    "failed to open database at {}, falling back to in-memory: {}",
                    db_path, err
                );
                Builder::new_local(":memory:").build().await?
            }
        };

        let store = Self { db };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.db.connect()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                plant_type TEXT,
                main_image TEXT NOT NULL,
                macro_image TEXT,
                diagnosis TEXT NOT NULL,
                is_public INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            )
            "#,
            (),
        )
        .await?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_updates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                analysis_id TEXT NOT NULL,
                note TEXT NOT NULL,
                image TEXT,
                created_at DATETIME NOT NULL
            )
            "#,
            (),
        )
        .await?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                author_name TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                image TEXT,
                plant_type TEXT,
                likes TEXT NOT NULL,
                comments TEXT NOT NULL,
                related_analysis_id TEXT,
                created_at DATETIME NOT NULL
            )
            "#,
            (),
        )
        .await?;
        Ok(())
    }

    pub async fn save_analysis(
        &self,
        user_id: &str,
        plant_type: Option<String>,
        main_image: String,
        macro_image: Option<String>,
        diagnosis: &Diagnosis,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conn = self.db.connect()?;
        conn.execute(
            r#"
            INSERT INTO analyses (id, user_id, plant_type, main_image, macro_image, diagnosis, is_public, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
            (
                id.as_str(),
                user_id,
                plant_type,
                main_image,
                macro_image,
                serde_json::to_string(diagnosis)?,
                Utc::now().to_rfc3339(),
            ),
        )
        .await?;

        debug!("analysis saved: {}", id);
        Ok(id)
    }

    pub async fn get_analysis(&self, analysis_id: &str) -> Result<SavedAnalysis> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, plant_type, main_image, macro_image, diagnosis, is_public, created_at
                 FROM analyses WHERE id = ?",
                [analysis_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Err(Error::AnalysisNotFound {
                analysis_id: analysis_id.to_string(),
            });
        };

        let mut analysis = analysis_from_row(&row)?;
        analysis.updates = self.list_updates(&conn, analysis_id).await?;
        Ok(analysis)
    }

    /// A user's saved analyses, newest first, updates attached.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<SavedAnalysis>> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, plant_type, main_image, macro_image, diagnosis, is_public, created_at
                 FROM analyses WHERE user_id = ? ORDER BY created_at DESC",
                [user_id],
            )
            .await?;

        let mut analyses = Vec::new();
        while let Some(row) = rows.next().await? {
            analyses.push(analysis_from_row(&row)?);
        }

        for analysis in &mut analyses {
            analysis.updates = self.list_updates(&conn, &analysis.id).await?;
        }

        debug!("listed {} analyses for user {}", analyses.len(), user_id);
        Ok(analyses)
    }

    async fn list_updates(
        &self,
        conn: &libsql::Connection,
        analysis_id: &str,
    ) -> Result<Vec<AnalysisUpdate>> {
        let mut rows = conn
            .query(
                "SELECT note, image, created_at FROM analysis_updates
                 WHERE analysis_id = ? ORDER BY id DESC",
                [analysis_id],
            )
            .await?;

        let mut updates = Vec::new();
        while let Some(row) = rows.next().await? {
            updates.push(AnalysisUpdate {
                note: row.get(0)?,
                image: row.get(1)?,
                created_at: parse_timestamp(&row.get::<String>(2)?)?,
            });
        }
        Ok(updates)
    }

    pub async fn append_update(
        &self,
        analysis_id: &str,
        note: String,
        image: Option<String>,
    ) -> Result<()> {
        // Validates the target exists so a typo'd id errors instead of
        // writing an orphan row.
        self.get_analysis(analysis_id).await?;

        let conn = self.db.connect()?;
        conn.execute(
            "INSERT INTO analysis_updates (analysis_id, note, image, created_at) VALUES (?, ?, ?, ?)",
            (analysis_id, note, image, Utc::now().to_rfc3339()),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_analysis(&self, analysis_id: &str) -> Result<()> {
        let conn = self.db.connect()?;
        conn.execute(
            "DELETE FROM analysis_updates WHERE analysis_id = ?",
            [analysis_id],
        )
        .await?;
        let affected = conn
            .execute("DELETE FROM analyses WHERE id = ?", [analysis_id])
            .await?;
        if affected == 0 {
            return Err(Error::AnalysisNotFound {
                analysis_id: analysis_id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn set_public(&self, analysis_id: &str, is_public: bool) -> Result<()> {
        let conn = self.db.connect()?;
        let affected = conn
            .execute(
                "UPDATE analyses SET is_public = ? WHERE id = ?",
                (i64::from(is_public), analysis_id),
            )
            .await?;
        if affected == 0 {
            return Err(Error::AnalysisNotFound {
                analysis_id: analysis_id.to_string(),
            });
        }
        Ok(())
    }

    /// Publishes a saved analysis to the community feed and marks it public.
    pub async fn share_analysis(&self, analysis_id: &str, author_name: &str) -> Result<Post> {
        let analysis = self.get_analysis(analysis_id).await?;
        let post = Post::from_analysis(&analysis, author_name);
        self.insert_post(&post).await?;
        self.set_public(analysis_id, true).await?;
        info!("analysis {} shared as post {}", analysis_id, post.id);
        Ok(post)
    }

    pub async fn insert_post(&self, post: &Post) -> Result<()> {
        let conn = self.db.connect()?;
        conn.execute(
            r#"
            INSERT INTO posts (id, user_id, author_name, title, content, image, plant_type, likes, comments, related_analysis_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            (
                post.id.as_str(),
                post.user_id.as_str(),
                post.author_name.as_str(),
                post.title.as_str(),
                post.content.as_str(),
                post.image.clone(),
                post.plant_type.clone(),
                serde_json::to_string(&post.likes)?,
                serde_json::to_string(&post.comments)?,
                post.related_analysis_id.clone(),
                post.created_at.to_rfc3339(),
            ),
        )
        .await?;
        Ok(())
    }

    pub async fn list_posts(&self) -> Result<Vec<Post>> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, author_name, title, content, image, plant_type, likes, comments, related_analysis_id, created_at
                 FROM posts ORDER BY created_at DESC",
                (),
            )
            .await?;

        let mut posts = Vec::new();
        while let Some(row) = rows.next().await? {
            posts.push(post_from_row(&row)?);
        }
        Ok(posts)
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Post> {
        let conn = self.db.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, user_id, author_name, title, content, image, plant_type, likes, comments, related_analysis_id, created_at
                 FROM posts WHERE id = ?",
                [post_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Err(Error::PostNotFound {
                post_id: post_id.to_string(),
            });
        };
        post_from_row(&row)
    }

    /// Deletes a post; a post shared from an analysis resets that analysis's
    /// public flag (the source may itself be gone, which is fine).
    pub async fn delete_post(&self, post_id: &str) -> Result<()> {
        let post = self.get_post(post_id).await?;
        if let Some(analysis_id) = &post.related_analysis_id {
            if let Err(err) = self.set_public(analysis_id, false).await {
                warn!("could not reset source analysis visibility: {}", err);
            }
        }

        let conn = self.db.connect()?;
        conn.execute("DELETE FROM posts WHERE id = ?", [post_id])
            .await?;
        Ok(())
    }

    /// Adds the user to the post's likes, or removes them if already present.
    /// Returns the resulting like list.
    pub async fn toggle_like(&self, post_id: &str, user_id: &str) -> Result<Vec<String>> {
        let post = self.get_post(post_id).await?;
        let mut likes = post.likes;
        match likes.iter().position(|liker| liker == user_id) {
            Some(index) => {
                likes.remove(index);
            }
            None => likes.push(user_id.to_string()),
        }

        let conn = self.db.connect()?;
        conn.execute(
            "UPDATE posts SET likes = ? WHERE id = ?",
            (serde_json::to_string(&likes)?, post_id),
        )
        .await?;
        Ok(likes)
    }

    pub async fn add_comment(&self, post_id: &str, comment: Comment) -> Result<Post> {
        let mut post = self.get_post(post_id).await?;
        post.comments.push(comment);

        let conn = self.db.connect()?;
        conn.execute(
            "UPDATE posts SET comments = ? WHERE id = ?",
            (serde_json::to_string(&post.comments)?, post_id),
        )
        .await?;
        Ok(post)
    }
}

fn analysis_from_row(row: &libsql::Row) -> Result<SavedAnalysis> {
    let diagnosis_json: String = row.get(5)?;
    let diagnosis: Diagnosis = serde_json::from_str(&diagnosis_json)?;
    Ok(SavedAnalysis {
        id: row.get(0)?,
        user_id: row.get(1)?,
        plant_type: row.get(2)?,
        main_image: row.get(3)?,
        macro_image: row.get(4)?,
        diagnosis,
        is_public: row.get::<i64>(6)? != 0,
        created_at: parse_timestamp(&row.get::<String>(7)?)?,
        updates: Vec::new(),
    })
}

fn post_from_row(row: &libsql::Row) -> Result<Post> {
    let likes_json: String = row.get(7)?;
    let comments_json: String = row.get(8)?;
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author_name: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        image: row.get(5)?,
        plant_type: row.get(6)?,
        likes: serde_json::from_str(&likes_json)?,
        comments: serde_json::from_str(&comments_json)?,
        related_analysis_id: row.get(9)?,
        created_at: parse_timestamp(&row.get::<String>(10)?)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|stamp| stamp.with_timezone(&Utc))
        .map_err(|err| Error::internal(format!("failed to parse timestamp: {err}")))
}
