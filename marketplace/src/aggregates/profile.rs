//! DJ profile editing.
//!
//! A signed-in user owns at most one profile. `Save` creates or updates it
//! (always keeping the current visibility), `Publish`/`Unpublish` toggle the
//! directory listing and `SetAvatar` uploads a photo and stores its URL.

use super::Outcome;
use crate::providers::{AvatarStorage, AvatarUpload};
use crate::repositories::{ProfileRepository, RepositoryError};
use crate::types::Profile;
use crate::validation::ProfileInput;
use gigbook_core::{effect::Effect, environment::Clock, reducer::Reducer, smallvec, SmallVec};
use gigbook_postgres::Actor;
use std::sync::Arc;
use uuid::Uuid;

const SLUG_TAKEN: &str = "That URL is already taken";

// ============================================================================
// Actions
// ============================================================================

/// Profile commands and their results.
#[derive(Clone, Debug)]
pub enum ProfileAction {
    // Commands
    /// Create or update the profile from the edit form.
    Save {
        /// Signed-in owner.
        actor: Actor,
        /// Raw form.
        input: ProfileInput,
    },
    /// List the profile in the directory.
    Publish {
        /// Signed-in owner.
        actor: Actor,
    },
    /// Hide the profile from the directory.
    Unpublish {
        /// Signed-in owner.
        actor: Actor,
    },
    /// Replace the avatar.
    SetAvatar {
        /// Signed-in owner.
        actor: Actor,
        /// Checked image.
        upload: AvatarUpload,
    },

    // Results
    /// The profile was stored.
    Saved {
        /// Stored row.
        profile: Profile,
    },
    /// The command is not allowed.
    Rejected {
        /// Form field at fault, if any.
        field: Option<&'static str>,
        /// User-facing explanation.
        reason: String,
    },
    /// A collaborator failed.
    Failed {
        /// Internal error text.
        error: String,
    },
}

impl Outcome for ProfileAction {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Saved { .. } | Self::Rejected { .. } | Self::Failed { .. }
        )
    }
}

// ============================================================================
// State & environment
// ============================================================================

/// The owner's profile, if they have one yet.
#[derive(Clone, Debug, Default)]
pub struct ProfileState {
    /// Current row.
    pub profile: Option<Profile>,
    /// Last rejection or failure.
    pub last_error: Option<String>,
}

impl ProfileState {
    /// State around an existing (or missing) profile.
    #[must_use]
    pub const fn new(profile: Option<Profile>) -> Self {
        Self {
            profile,
            last_error: None,
        }
    }
}

/// Collaborators for the profile reducer.
#[derive(Clone)]
pub struct ProfileEnvironment {
    /// Profile rows.
    pub profiles: Arc<dyn ProfileRepository>,
    /// Avatar images.
    pub storage: Arc<dyn AvatarStorage>,
    /// Timestamps.
    pub clock: Arc<dyn Clock>,
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for DJ profiles.
#[derive(Clone, Debug, Default)]
pub struct ProfileReducer;

impl ProfileReducer {
    /// Creates a new `ProfileReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(
        field: Option<&'static str>,
        reason: impl Into<String>,
    ) -> SmallVec<[Effect<ProfileAction>; 4]> {
        smallvec![Effect::send(ProfileAction::Rejected {
            field,
            reason: reason.into()
        })]
    }

    /// The signed-in user and their current profile, when they own it.
    fn owner<'a>(state: &'a ProfileState, actor: &Actor) -> Result<(Uuid, Option<&'a Profile>), String> {
        let Some(user_id) = actor.user_id() else {
            return Err("Sign in to edit your profile".to_string());
        };
        match state.profile.as_ref() {
            Some(profile) if profile.user_id != user_id => {
                Err("You can only edit your own profile".to_string())
            },
            current => Ok((user_id, current)),
        }
    }

    fn publish_blockers(profile: &Profile) -> Option<String> {
        let missing = profile.missing_for_publish();
        (!missing.is_empty()).then(|| format!("Add {} before publishing", missing.join(", ")))
    }

    fn save(
        actor: Actor,
        profile: Profile,
        check_slug: bool,
        env: &ProfileEnvironment,
    ) -> Effect<ProfileAction> {
        let profiles = Arc::clone(&env.profiles);
        Effect::run(async move {
            if check_slug {
                match profiles.slug_taken(&actor, &profile.slug, profile.user_id).await {
                    Ok(false) => {},
                    Ok(true) => {
                        return Some(ProfileAction::Rejected {
                            field: Some("slug"),
                            reason: SLUG_TAKEN.to_string(),
                        })
                    },
                    Err(error) => return Some(Self::storage_failure(error)),
                }
            }
            if let Err(error) = profiles.save(&actor, &profile).await {
                return Some(Self::storage_failure(error));
            }
            tracing::info!(profile = %profile.slug, published = profile.published, "Profile saved");
            Some(ProfileAction::Saved { profile })
        })
    }

    fn storage_failure(error: RepositoryError) -> ProfileAction {
        match error {
            // The unique index is the final word on slugs.
            RepositoryError::Conflict(_) => ProfileAction::Rejected {
                field: Some("slug"),
                reason: SLUG_TAKEN.to_string(),
            },
            RepositoryError::NotFound => ProfileAction::Rejected {
                field: None,
                reason: "You can only edit your own profile".to_string(),
            },
            RepositoryError::Database(error) => {
                tracing::error!(%error, "Profile persistence failed");
                ProfileAction::Failed {
                    error: error.to_string(),
                }
            },
        }
    }

    fn save_form(
        state: &ProfileState,
        actor: Actor,
        input: &ProfileInput,
        env: &ProfileEnvironment,
    ) -> SmallVec<[Effect<ProfileAction>; 4]> {
        let (user_id, current) = match Self::owner(state, &actor) {
            Ok(owner) => owner,
            Err(reason) => return Self::reject(None, reason),
        };
        let fields = match input.validate() {
            Ok(fields) => fields,
            Err(error) => return Self::reject(Some(error.field), error.message),
        };

        let now = env.clock.now();
        let contact_email = if fields.contact_email.is_empty() {
            // Fall back to the account address.
            match &actor {
                Actor::User { email, .. } => email.clone().unwrap_or_default(),
                Actor::Anonymous | Actor::Service => String::new(),
            }
        } else {
            fields.contact_email
        };
        let profile = Profile {
            id: current.map_or_else(Uuid::new_v4, |p| p.id),
            user_id,
            slug: fields.slug,
            display_name: fields.display_name,
            city: fields.city,
            genres: fields.genres,
            bio: fields.bio,
            rate_from_cents: fields.rate_from_cents,
            contact_email,
            avatar_url: current.and_then(|p| p.avatar_url.clone()),
            published: current.is_some_and(|p| p.published),
            created_at: current.map_or(now, |p| p.created_at),
            updated_at: now,
        };

        if profile.published {
            if let Some(reason) = Self::publish_blockers(&profile) {
                return Self::reject(None, format!("{reason}. Unpublish to save an incomplete profile"));
            }
        }

        smallvec![Self::save(actor, profile, true, env)]
    }

    fn set_published(
        state: &ProfileState,
        actor: Actor,
        published: bool,
        env: &ProfileEnvironment,
    ) -> SmallVec<[Effect<ProfileAction>; 4]> {
        let current = match Self::owner(state, &actor) {
            Ok((_, Some(current))) => current,
            Ok((_, None)) => return Self::reject(None, "Save your profile first"),
            Err(reason) => return Self::reject(None, reason),
        };
        if current.published == published {
            // Nothing to change; report the row as saved.
            return smallvec![Effect::send(ProfileAction::Saved {
                profile: current.clone()
            })];
        }
        if published {
            if let Some(reason) = Self::publish_blockers(current) {
                return Self::reject(None, reason);
            }
        }

        let mut profile = current.clone();
        profile.published = published;
        profile.updated_at = env.clock.now();
        smallvec![Self::save(actor, profile, false, env)]
    }

    fn set_avatar(
        state: &ProfileState,
        actor: Actor,
        upload: AvatarUpload,
        env: &ProfileEnvironment,
    ) -> SmallVec<[Effect<ProfileAction>; 4]> {
        let (user_id, current) = match Self::owner(state, &actor) {
            Ok((user_id, Some(current))) => (user_id, current),
            Ok((_, None)) => return Self::reject(None, "Save your profile before adding a photo"),
            Err(reason) => return Self::reject(None, reason),
        };

        let mut profile = current.clone();
        let path = upload.path_for(user_id);
        let storage = Arc::clone(&env.storage);
        let profiles = Arc::clone(&env.profiles);
        let now = env.clock.now();

        smallvec![Effect::run(async move {
            let url = match storage.upload(&path, &upload.content_type, upload.bytes).await {
                Ok(url) => url,
                Err(error) if error.is_user_error() => {
                    return Some(ProfileAction::Rejected {
                        field: Some("avatar"),
                        reason: error.to_string(),
                    })
                },
                Err(error) => {
                    tracing::error!(%error, %path, "Avatar upload failed");
                    return Some(ProfileAction::Failed {
                        error: error.to_string(),
                    });
                },
            };

            profile.avatar_url = Some(url);
            profile.updated_at = now;
            if let Err(error) = profiles.save(&actor, &profile).await {
                return Some(Self::storage_failure(error));
            }
            metrics::counter!("profile.avatar.uploaded").increment(1);
            Some(ProfileAction::Saved { profile })
        })]
    }
}

impl Reducer for ProfileReducer {
    type State = ProfileState;
    type Action = ProfileAction;
    type Environment = ProfileEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ProfileAction::Save { actor, input } => Self::save_form(state, actor, &input, env),
            ProfileAction::Publish { actor } => Self::set_published(state, actor, true, env),
            ProfileAction::Unpublish { actor } => Self::set_published(state, actor, false, env),
            ProfileAction::SetAvatar { actor, upload } => Self::set_avatar(state, actor, upload, env),

            ProfileAction::Saved { profile } => {
                state.profile = Some(profile);
                state.last_error = None;
                SmallVec::new()
            },
            ProfileAction::Rejected { reason, .. } => {
                state.last_error = Some(reason);
                SmallVec::new()
            },
            ProfileAction::Failed { error } => {
                state.last_error = Some(error);
                SmallVec::new()
            },
        }
    }
}
