use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};
use tracing::{info, instrument, warn};
use url::Url;

use crate::link_repo::{
    Link, LinkCode, LinkCodeValidationError, LinkRepository, SaveLinkError,
    link_repository_capsule,
};

/// How many freshly generated codes to try before giving up.
pub const GENERATE_ATTEMPTS: usize = 5;

#[derive(Debug, Deserialize)]
pub struct CreateLinkPayload {
    pub url: Option<String>,
    pub code: Option<String>,
}

/// A link as exposed over the API and on rendered pages.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkDetails {
    pub code: String,
    pub target_url: String,
    pub total_clicks: u64,
    /// Timestamp in RFC 3339 format
    pub last_clicked_at: Option<String>,
    /// Timestamp in RFC 3339 format
    pub created_at: String,
}

#[derive(Debug)]
pub struct Redirect {
    pub url: String,
}

pub fn link_service_capsule(CapsuleHandle { mut get, .. }: CapsuleHandle) -> Arc<dyn LinkService> {
    let link_repo = Arc::clone(get.as_ref(link_repository_capsule));
    Arc::new(LinkServiceImpl { link_repo })
}

#[async_trait]
pub trait LinkService: Send + Sync {
    /// Creates a link to `url`, under `custom_code` when one is given.
    async fn create_link(
        &self,
        url: &str,
        custom_code: Option<&str>,
    ) -> Result<LinkDetails, CreateLinkError>;
    async fn list_links(&self) -> Result<Vec<LinkDetails>, ListLinksError>;
    async fn get_link(&self, code: &str) -> Result<LinkDetails, GetLinkError>;
    async fn delete_link(&self, code: &str) -> Result<(), DeleteLinkError>;
    /// Counts a visit to the link and tells where to send the visitor.
    async fn follow_link(&self, code: &str) -> Result<Redirect, FollowLinkError>;
}

#[derive(Debug, Error)]
pub enum CreateLinkError {
    #[error("URL is required")]
    MissingUrl,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Code must match [A-Za-z0-9]{{6,8}}: {0}")]
    InvalidCode(#[from] LinkCodeValidationError),
    #[error("Code already exists")]
    CodeAlreadyTaken,
    #[error("Failed to generate unique code")]
    GenerationExhausted,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error), // NOTE: no #[from] so we have to be explicit
}

#[derive(Debug, Error)]
pub enum ListLinksError {
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum GetLinkError {
    #[error("Not found")]
    NotFound,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum DeleteLinkError {
    #[error("Not found")]
    NotFound,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum FollowLinkError {
    #[error("Not found")]
    NotFound,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

struct LinkServiceImpl {
    link_repo: Arc<dyn LinkRepository>,
}

impl LinkServiceImpl {
    /// Picks a code that is not in use yet, or gives up after [`GENERATE_ATTEMPTS`].
    async fn generate_unused_code(&self) -> Result<LinkCode, CreateLinkError> {
        for _ in 0..GENERATE_ATTEMPTS {
            let attempt = LinkCode::generate();
            if attempt.is_reserved() {
                warn!(%attempt, "Generated a reserved code");
                continue;
            }
            match self.link_repo.retrieve_link(attempt.as_str()).await {
                Ok(None) => return Ok(attempt),
                Ok(Some(_)) => warn!(%attempt, "Generated code that was already taken"),
                Err(err) => return Err(CreateLinkError::Internal(err)),
            }
        }
        Err(CreateLinkError::GenerationExhausted)
    }

    async fn ensure_code_unused(&self, code: &LinkCode) -> Result<(), CreateLinkError> {
        if code.is_reserved() {
            return Err(CreateLinkError::CodeAlreadyTaken);
        }
        match self.link_repo.retrieve_link(code.as_str()).await {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(CreateLinkError::CodeAlreadyTaken),
            Err(err) => Err(CreateLinkError::Internal(err)),
        }
    }
}

#[async_trait]
impl LinkService for LinkServiceImpl {
    #[instrument(skip(self))]
    async fn create_link(
        &self,
        url: &str,
        custom_code: Option<&str>,
    ) -> Result<LinkDetails, CreateLinkError> {
        let target_url = url.trim();
        if target_url.is_empty() {
            return Err(CreateLinkError::MissingUrl);
        }
        // NOTE: parsed for validation only; the URL is stored as given
        Url::parse(target_url)?;

        let code = match custom_code.map(str::trim).filter(|code| !code.is_empty()) {
            Some(custom_code) => {
                let code = LinkCode::new(custom_code.to_owned())?;
                self.ensure_code_unused(&code).await?;
                code
            }
            None => self.generate_unused_code().await?,
        };

        let to_save = Link {
            code,
            target_url: target_url.to_owned(),
            total_clicks: 0,
            last_clicked_at: None,
            created_at: OffsetDateTime::now_utc(),
        };

        // NOTE: the uniqueness check above can race with a concurrent insert;
        // the store's primary key has the final say
        let saved = self
            .link_repo
            .save_link(to_save)
            .await
            .map_err(|err| match err {
                SaveLinkError::CodeAlreadyTaken => CreateLinkError::CodeAlreadyTaken,
                SaveLinkError::Internal(err) => CreateLinkError::Internal(err),
            })?;
        info!(code = %saved.code, "Created link");

        saved
            .try_into()
            .context("Failed to convert new Link into external format")
            .map_err(CreateLinkError::Internal)
    }

    #[instrument(skip(self))]
    async fn list_links(&self) -> Result<Vec<LinkDetails>, ListLinksError> {
        self.link_repo
            .list_links()
            .await
            .and_then(|links| links.into_iter().map(LinkDetails::try_from).collect())
            .map_err(ListLinksError::Internal)
    }

    #[instrument(skip(self))]
    async fn get_link(&self, code: &str) -> Result<LinkDetails, GetLinkError> {
        match self.link_repo.retrieve_link(code).await {
            Ok(Some(link)) => link.try_into().map_err(GetLinkError::Internal),
            Ok(None) => Err(GetLinkError::NotFound),
            Err(err) => Err(GetLinkError::Internal(err)),
        }
    }

    #[instrument(skip(self))]
    async fn delete_link(&self, code: &str) -> Result<(), DeleteLinkError> {
        match self.link_repo.delete_link(code).await {
            Ok(true) => {
                info!(code, "Deleted link");
                Ok(())
            }
            Ok(false) => Err(DeleteLinkError::NotFound),
            Err(err) => Err(DeleteLinkError::Internal(err)),
        }
    }

    #[instrument(skip(self))]
    async fn follow_link(&self, code: &str) -> Result<Redirect, FollowLinkError> {
        let link = match self.link_repo.retrieve_link(code).await {
            Ok(Some(link)) => link,
            Ok(None) => return Err(FollowLinkError::NotFound),
            Err(err) => return Err(FollowLinkError::Internal(err)),
        };

        match self
            .link_repo
            .record_click(code, OffsetDateTime::now_utc())
            .await
        {
            Ok(true) => Ok(Redirect {
                url: link.target_url,
            }),
            // NOTE: deleted between the lookup and the click
            Ok(false) => Err(FollowLinkError::NotFound),
            Err(err) => Err(FollowLinkError::Internal(err)),
        }
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, time::error::Format> {
    timestamp.to_offset(UtcOffset::UTC).format(&Rfc3339)
}

impl TryFrom<Link> for LinkDetails {
    type Error = anyhow::Error;

    fn try_from(
        Link {
            code,
            target_url,
            total_clicks,
            last_clicked_at,
            created_at,
        }: Link,
    ) -> Result<Self, Self::Error> {
        Ok(Self {
            code: code.into_inner(),
            target_url,
            total_clicks,
            last_clicked_at: last_clicked_at
                .map(format_timestamp)
                .transpose()
                .context("Failed to format last-clicked timestamp")?,
            created_at: format_timestamp(created_at)
                .context("Failed to format creation timestamp")?,
        })
    }
}
