//! Group messaging: match players by name, fan out `message_player` calls.

use std::sync::Arc;

use crcon::CrconApi;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::warn;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProperties {
    pub name: String,
    pub id: String,
}

/// Matches players by exact name, name prefix, or a `/regex/` selector
/// anchored at the start of the name.
pub struct PlayerMatcher {
    selector: String,
    pattern: Option<Regex>,
    exact: bool,
}

impl PlayerMatcher {
    pub fn new(selector: &str) -> Result<Self> {
        Self::with_exact(selector, false)
    }

    pub fn with_exact(selector: &str, exact: bool) -> Result<Self> {
        let pattern = if selector.len() >= 2 && selector.starts_with('/') && selector.ends_with('/')
        {
            let inner = selector.trim_matches('/');
            Some(
                Regex::new(inner)
                    .map_err(|_| Error::validation("selector is not a valid regular expression"))?,
            )
        } else {
            None
        };
        if exact && pattern.is_some() {
            return Err(Error::validation(
                "exact match requires a simple string selector",
            ));
        }
        Ok(Self {
            selector: selector.to_string(),
            pattern,
            exact,
        })
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn is_match(&self, player: &PlayerProperties) -> bool {
        if self.exact {
            return player.name == self.selector;
        }
        match &self.pattern {
            None => player.name.starts_with(&self.selector),
            Some(pattern) => pattern
                .find(&player.name)
                .is_some_and(|m| m.start() == 0),
        }
    }
}

pub struct MessageSender<C: CrconApi + 'static> {
    client: Arc<C>,
}

impl<C: CrconApi + 'static> MessageSender<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Players currently online whose names satisfy the matcher.
    pub async fn players_in_group(&self, matcher: &PlayerMatcher) -> Result<Vec<PlayerProperties>> {
        let player_ids = self.client.get_playerids().await?;
        Ok(player_ids
            .into_iter()
            .map(|(name, id)| PlayerProperties { name, id })
            .filter(|player| matcher.is_match(player))
            .collect())
    }

    /// Messages every matched player concurrently, returning those the
    /// server accepted delivery for.
    pub async fn send_group_message(
        &self,
        matcher: &PlayerMatcher,
        message: &str,
    ) -> Result<Vec<PlayerProperties>> {
        let matched = self.players_in_group(matcher).await?;

        let mut tasks: JoinSet<Option<PlayerProperties>> = JoinSet::new();
        for player in matched {
            let client = self.client.clone();
            let message = message.to_string();
            tasks.spawn(async move {
                match client.message_player(&player.id, &message).await {
                    Ok(()) => Some(player),
                    Err(e) => {
                        warn!(player = %player.name, error = %e, "failed to message player");
                        None
                    }
                }
            });
        }

        let mut delivered = Vec::new();
        while let Some(result) = tasks.join_next().await {
            if let Ok(Some(player)) = result {
                delivered.push(player);
            }
        }
        Ok(delivered)
    }
}
