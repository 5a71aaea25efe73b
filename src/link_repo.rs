use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbConn, DbErr, EntityTrait, ExprTrait,
    QueryFilter, QueryOrder, SqlErr, sea_query::Expr,
};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::instrument;

pub use crate::link_code::{LinkCode, LinkCodeValidationError};
use crate::{config::db_conn_capsule, orm::link};

pub fn link_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn LinkRepository> {
    let db = get.as_ref(db_conn_capsule).clone();
    Arc::new(LinkRepositoryImpl { db })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub code: LinkCode,
    /// Exactly as the caller gave it; only validated, never normalized.
    pub target_url: String,
    pub total_clicks: u64,
    pub last_clicked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait LinkRepository: Send + Sync {
    async fn retrieve_link(&self, code: &str) -> anyhow::Result<Option<Link>>;

    /// All links, newest first.
    async fn list_links(&self) -> anyhow::Result<Vec<Link>>;

    /// Inserts a new [`Link`]; never overwrites an existing one.
    async fn save_link(&self, link: Link) -> Result<Link, SaveLinkError>;

    /// Returns `false` if there was no link with the given code.
    async fn delete_link(&self, code: &str) -> anyhow::Result<bool>;

    /// Bumps the click counter by one and stamps `clicked_at`.
    /// Returns `false` if there was no link with the given code.
    async fn record_click(&self, code: &str, clicked_at: OffsetDateTime) -> anyhow::Result<bool>;
}

#[derive(Debug, Error)]
pub enum SaveLinkError {
    #[error("a link with this code already exists")]
    CodeAlreadyTaken,
    #[error(transparent)]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

struct LinkRepositoryImpl {
    db: DbConn,
}

#[async_trait]
impl LinkRepository for LinkRepositoryImpl {
    #[instrument(skip(self))]
    async fn retrieve_link(&self, code: &str) -> anyhow::Result<Option<Link>> {
        link::Entity::find_by_id(code)
            .one(&self.db)
            .await
            .context("Failed to retrieve link")?
            .map(Link::try_from)
            .transpose()
    }

    #[instrument(skip(self))]
    async fn list_links(&self) -> anyhow::Result<Vec<Link>> {
        link::Entity::find()
            .order_by_desc(link::Column::CreatedAt)
            .all(&self.db)
            .await
            .context("Failed to list links")?
            .into_iter()
            .map(Link::try_from)
            .collect()
    }

    #[instrument(skip(self))]
    async fn save_link(&self, to_save: Link) -> Result<Link, SaveLinkError> {
        let to_insert = link::ActiveModel {
            code: Set(to_save.code.into_inner()),
            target_url: Set(to_save.target_url),
            total_clicks: Set(i64::try_from(to_save.total_clicks)
                .context("Click count overflow")
                .map_err(SaveLinkError::Internal)?),
            last_clicked_at: Set(to_save.last_clicked_at),
            created_at: Set(to_save.created_at),
        };

        match to_insert.insert(&self.db).await {
            Ok(inserted) => inserted.try_into().map_err(SaveLinkError::Internal),
            Err(err) if is_unique_violation(&err) => Err(SaveLinkError::CodeAlreadyTaken),
            Err(err) => Err(SaveLinkError::Internal(
                anyhow::Error::new(err).context("Failed to insert link"),
            )),
        }
    }

    #[instrument(skip(self))]
    async fn delete_link(&self, code: &str) -> anyhow::Result<bool> {
        let result = link::Entity::delete_by_id(code)
            .exec(&self.db)
            .await
            .context("Failed to delete link")?;
        Ok(result.rows_affected > 0)
    }

    #[instrument(skip(self))]
    async fn record_click(&self, code: &str, clicked_at: OffsetDateTime) -> anyhow::Result<bool> {
        let result = link::Entity::update_many()
            .col_expr(
                link::Column::TotalClicks,
                Expr::col(link::Column::TotalClicks).add(1_i64),
            )
            .col_expr(link::Column::LastClickedAt, Expr::val(clicked_at))
            .filter(link::Column::Code.eq(code))
            .exec(&self.db)
            .await
            .context("Failed to record click")?;
        Ok(result.rows_affected > 0)
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

impl TryFrom<link::Model> for Link {
    type Error = anyhow::Error;

    fn try_from(
        link::Model {
            code,
            target_url,
            total_clicks,
            last_clicked_at,
            created_at,
        }: link::Model,
    ) -> Result<Self, Self::Error> {
        Ok(Self {
            code: LinkCode::new(code).context("Stored link has a malformed code")?,
            target_url,
            total_clicks: u64::try_from(total_clicks).context("Stored click count is negative")?,
            last_clicked_at,
            created_at,
        })
    }
}
