//! Public directory and profile pages.

use super::{actor_for, money, not_found, render, Chrome};
use crate::server::AppState;
use crate::types::{DirectoryFilter, Profile};
use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::Html;
use gigbook_auth::MaybeUser;
use gigbook_postgres::Actor;
use gigbook_web::{Flash, WebResult};

/// A profile as shown on cards and the profile page.
#[derive(Debug, Clone)]
pub struct ProfileView {
    /// URL segment.
    pub slug: String,
    /// Stage name.
    pub display_name: String,
    /// Home city.
    pub city: String,
    /// Genres.
    pub genres: Vec<String>,
    /// Bio.
    pub bio: String,
    /// Formatted starting rate.
    pub rate_from: Option<String>,
    /// Avatar image.
    pub avatar_url: Option<String>,
    /// Listed in the directory.
    pub published: bool,
}

impl ProfileView {
    pub(crate) fn new(profile: &Profile, currency: &str) -> Self {
        Self {
            slug: profile.slug.clone(),
            display_name: profile.display_name.clone(),
            city: profile.city.clone(),
            genres: profile.genres.clone(),
            bio: profile.bio.clone(),
            rate_from: profile.rate_from_cents.map(|cents| money(cents, currency)),
            avatar_url: profile.avatar_url.clone(),
            published: profile.published,
        }
    }

    /// Genres as one comma-separated line.
    #[must_use]
    pub fn genre_line(&self) -> String {
        self.genres.join(", ")
    }
}

#[derive(Template)]
#[template(path = "directory.html")]
struct DirectoryPage {
    chrome: Chrome,
    profiles: Vec<ProfileView>,
    city: String,
    genre: String,
    filtered: bool,
}

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfilePage {
    chrome: Chrome,
    profile: ProfileView,
    preview: bool,
    min_date: String,
}

/// `GET /`
pub async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(filter): Query<DirectoryFilter>,
    Query(flash): Query<Flash>,
) -> WebResult<Html<String>> {
    let filter = filter.normalized();
    let actor = user.as_ref().map_or(Actor::Anonymous, actor_for);
    let profiles = state.services.profiles.list_published(&actor, &filter).await?;
    tracing::debug!(count = profiles.len(), city = ?filter.city, genre = ?filter.genre, "Directory listed");

    let currency = &state.settings.deposit.currency;
    render(&DirectoryPage {
        chrome: Chrome::new(user.as_ref(), flash),
        profiles: profiles.iter().map(|p| ProfileView::new(p, currency)).collect(),
        filtered: filter.city.is_some() || filter.genre.is_some(),
        city: filter.city.unwrap_or_default(),
        genre: filter.genre.unwrap_or_default(),
    })
}

/// `GET /dj/:slug`
///
/// Drafts are only visible to their owner, who sees a preview banner.
pub async fn show(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(slug): Path<String>,
    Query(flash): Query<Flash>,
) -> WebResult<Html<String>> {
    let actor = user.as_ref().map_or(Actor::Anonymous, actor_for);
    let profile = state
        .services
        .profiles
        .find_by_slug(&actor, &slug.to_ascii_lowercase())
        .await?
        .ok_or_else(not_found)?;

    let owner = profile.is_owned_by(actor.user_id());
    if !profile.published && !owner {
        return Err(not_found());
    }

    render(&ProfilePage {
        chrome: Chrome::new(user.as_ref(), flash),
        profile: ProfileView::new(&profile, &state.settings.deposit.currency),
        preview: !profile.published,
        min_date: state.services.clock.now().date_naive().format("%Y-%m-%d").to_string(),
    })
}
