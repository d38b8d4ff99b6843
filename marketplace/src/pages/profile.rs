//! The DJ's profile editor.

use super::{actor_for, render, Chrome};
use crate::aggregates::execute;
use crate::aggregates::profile::{ProfileAction, ProfileReducer, ProfileState};
use crate::providers::storage::MAX_AVATAR_BYTES;
use crate::providers::{AvatarUpload, StorageError};
use crate::server::AppState;
use crate::types::Profile;
use crate::validation::ProfileInput;
use askama::Template;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, Redirect};
use axum::Form;
use gigbook_auth::{AuthUser, CurrentUser};
use gigbook_web::{flash, AppError, Flash, WebResult};

const EDIT_PATH: &str = "/dashboard/profile";

/// Form field holding the avatar file.
pub const AVATAR_FIELD: &str = "avatar";

/// Request body limit for the avatar route, leaving room for multipart
/// framing around a maximum-size image.
pub const AVATAR_BODY_LIMIT: usize = MAX_AVATAR_BYTES + 64 * 1024;

/// Current values for the edit form.
#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    /// Slug.
    pub slug: String,
    /// Stage name.
    pub display_name: String,
    /// City.
    pub city: String,
    /// Comma-separated genres.
    pub genres: String,
    /// Bio.
    pub bio: String,
    /// Starting rate in major units.
    pub rate_from: String,
    /// Notification address.
    pub contact_email: String,
}

impl ProfileForm {
    fn new(profile: Option<&Profile>, user: &AuthUser) -> Self {
        let Some(profile) = profile else {
            return Self {
                contact_email: user.email.clone().unwrap_or_default(),
                ..Self::default()
            };
        };
        Self {
            slug: profile.slug.clone(),
            display_name: profile.display_name.clone(),
            city: profile.city.clone(),
            genres: profile.genres.join(", "),
            bio: profile.bio.clone(),
            rate_from: profile.rate_from_cents.map(rate_input).unwrap_or_default(),
            contact_email: profile.contact_email.clone(),
        }
    }
}

/// `25000` → `250`, `25050` → `250.50`.
fn rate_input(cents: i64) -> String {
    if cents % 100 == 0 {
        (cents / 100).to_string()
    } else {
        format!("{}.{:02}", cents / 100, cents % 100)
    }
}

#[derive(Template)]
#[template(path = "profile_edit.html")]
struct ProfileEditPage {
    chrome: Chrome,
    form: ProfileForm,
    exists: bool,
    published: bool,
    public_path: Option<String>,
    avatar_url: Option<String>,
    missing: Vec<&'static str>,
}

/// `GET /dashboard/profile`
pub async fn edit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(flash): Query<Flash>,
) -> WebResult<Html<String>> {
    let profile = state
        .services
        .profiles
        .find_by_user(&actor_for(&user), user.id)
        .await?;

    render(&ProfileEditPage {
        chrome: Chrome::new(Some(&user), flash),
        form: ProfileForm::new(profile.as_ref(), &user),
        exists: profile.is_some(),
        published: profile.as_ref().is_some_and(|p| p.published),
        public_path: profile.as_ref().map(|p| format!("/dj/{}", p.slug)),
        avatar_url: profile.as_ref().and_then(|p| p.avatar_url.clone()),
        missing: profile.as_ref().map(Profile::missing_for_publish).unwrap_or_default(),
    })
}

/// Load the owner's profile and run `command` against it.
async fn run(state: &AppState, user: &AuthUser, command: ProfileAction, done: &str) -> WebResult<Redirect> {
    let profile = state
        .services
        .profiles
        .find_by_user(&actor_for(user), user.id)
        .await?;

    let outcome = execute(
        ProfileReducer::new(),
        ProfileState::new(profile),
        state.profile_env(),
        command,
    )
    .await?;

    match outcome {
        ProfileAction::Saved { .. } => Ok(flash::message(EDIT_PATH, done)),
        ProfileAction::Rejected { reason, .. } => Ok(flash::error(EDIT_PATH, &reason)),
        ProfileAction::Failed { error } => {
            Err(AppError::unavailable("Service temporarily unavailable").with_source(anyhow::anyhow!(error)))
        },
        other => Err(AppError::internal("Unexpected result").with_source(anyhow::anyhow!("{other:?}"))),
    }
}

/// `POST /dashboard/profile`
pub async fn save(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(input): Form<ProfileInput>,
) -> WebResult<Redirect> {
    let command = ProfileAction::Save {
        actor: actor_for(&user),
        input,
    };
    run(&state, &user, command, "Profile saved").await
}

/// `POST /dashboard/profile/publish`
pub async fn publish(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> WebResult<Redirect> {
    let command = ProfileAction::Publish { actor: actor_for(&user) };
    run(&state, &user, command, "Your profile is live in the directory").await
}

/// `POST /dashboard/profile/unpublish`
pub async fn unpublish(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> WebResult<Redirect> {
    let command = ProfileAction::Unpublish { actor: actor_for(&user) };
    run(&state, &user, command, "Your profile is hidden from the directory").await
}

/// `POST /dashboard/profile/avatar` (multipart)
pub async fn upload_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> WebResult<Redirect> {
    let mut file = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(error) => return Ok(multipart_error(error.status(), &error.body_text())),
        };
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(bytes) => file = Some((content_type, bytes.to_vec())),
            Err(error) => return Ok(multipart_error(error.status(), &error.body_text())),
        }
        break;
    }

    let Some((content_type, bytes)) = file else {
        return Ok(flash::error(EDIT_PATH, &StorageError::Empty.to_string()));
    };
    let upload = match AvatarUpload::new(&content_type, bytes) {
        Ok(upload) => upload,
        Err(error) => return Ok(flash::error(EDIT_PATH, &error.to_string())),
    };

    let command = ProfileAction::SetAvatar {
        actor: actor_for(&user),
        upload,
    };
    run(&state, &user, command, "Photo updated").await
}

fn multipart_error(status: StatusCode, detail: &str) -> Redirect {
    tracing::debug!(%status, detail, "Unreadable avatar upload");
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        flash::error(EDIT_PATH, &StorageError::TooLarge(MAX_AVATAR_BYTES + 1).to_string())
    } else {
        flash::error(EDIT_PATH, "That upload could not be read, please try again")
    }
}
