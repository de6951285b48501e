//! Rules for a user's movie lists.
//!
//! Rating a movie marks it watched, a watched movie cannot be on the
//! watchlist, and blocked movies cannot be on the watchlist or rewatch
//! list. Each toggle either keeps those rules or refuses with a message
//! meant for the user.

use crate::db::{MoviePreferences, PreferenceKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreferenceError {
    #[error("Please remove your rating before marking a movie as un-watched.")]
    RatedNotWatched,
    #[error("You cannot add a movie you have seen to your watchlist, did you mean to select the rewatch button?")]
    WatchlistSeen,
    #[error("You cannot add a movie you have excluded from recommendations to your watchlist.")]
    WatchlistBlocked,
    #[error("You cannot rewatch a movie you have not seen.")]
    RewatchUnseen,
    #[error("You cannot rewatch a movie you have excluded from recommendations.")]
    RewatchBlocked,
    #[error("Movie {0} is both liked and disliked.")]
    LikedAndDisliked(i64),
    #[error("Movie {0} is rated but not watched.")]
    RatedUnwatched(i64),
    #[error("Movie {0} is on the rewatch list but not watched.")]
    RewatchNotWatched(i64),
    #[error("Movie {0} is watched and on the watchlist.")]
    WatchedOnWatchlist(i64),
    #[error("Movie {0} is blocked and on the watchlist.")]
    BlockedOnWatchlist(i64),
    #[error("Movie {0} is blocked and on the rewatch list.")]
    BlockedRewatch(i64),
}

/// Toggle `kind` for `id`, applying the same side effects as the buttons
/// on the onboarding page.
pub fn toggle(prefs: &mut MoviePreferences, kind: PreferenceKind, id: i64) -> Result<(), PreferenceError> {
    match kind {
        PreferenceKind::Liked => {
            rate(prefs, id, PreferenceKind::Liked, PreferenceKind::Disliked);
            Ok(())
        }
        PreferenceKind::Disliked => {
            rate(prefs, id, PreferenceKind::Disliked, PreferenceKind::Liked);
            Ok(())
        }
        PreferenceKind::Watched => toggle_watched(prefs, id),
        PreferenceKind::Watchlist => toggle_watchlist(prefs, id),
        PreferenceKind::Rewatch => toggle_rewatch(prefs, id),
        PreferenceKind::Blocked => {
            toggle_blocked(prefs, id);
            Ok(())
        }
    }
}

fn rate(prefs: &mut MoviePreferences, id: i64, kind: PreferenceKind, opposite: PreferenceKind) {
    if prefs.set(kind).contains(&id) {
        prefs.set_mut(kind).remove(&id);
        return;
    }
    if !prefs.set_mut(opposite).remove(&id) {
        prefs.watchlist.remove(&id);
        prefs.watched.insert(id);
    }
    prefs.set_mut(kind).insert(id);
}

fn toggle_watched(prefs: &mut MoviePreferences, id: i64) -> Result<(), PreferenceError> {
    if prefs.watched.contains(&id) {
        if prefs.liked.contains(&id) || prefs.disliked.contains(&id) {
            return Err(PreferenceError::RatedNotWatched);
        }
        prefs.rewatch.remove(&id);
        prefs.watched.remove(&id);
        return Ok(());
    }
    prefs.watchlist.remove(&id);
    prefs.watched.insert(id);
    Ok(())
}

fn toggle_watchlist(prefs: &mut MoviePreferences, id: i64) -> Result<(), PreferenceError> {
    if prefs.watched.contains(&id) {
        return Err(PreferenceError::WatchlistSeen);
    }
    if prefs.blocked.contains(&id) {
        return Err(PreferenceError::WatchlistBlocked);
    }
    if !prefs.watchlist.remove(&id) {
        prefs.watchlist.insert(id);
    }
    Ok(())
}

fn toggle_rewatch(prefs: &mut MoviePreferences, id: i64) -> Result<(), PreferenceError> {
    if !prefs.watched.contains(&id) {
        return Err(PreferenceError::RewatchUnseen);
    }
    if prefs.blocked.contains(&id) {
        return Err(PreferenceError::RewatchBlocked);
    }
    if !prefs.rewatch.remove(&id) {
        prefs.rewatch.insert(id);
    }
    Ok(())
}

fn toggle_blocked(prefs: &mut MoviePreferences, id: i64) {
    if prefs.blocked.remove(&id) {
        return;
    }
    if !prefs.watchlist.remove(&id) && prefs.watched.contains(&id) {
        prefs.rewatch.remove(&id);
    }
    prefs.blocked.insert(id);
}

/// Check a whole submission against the rules the toggles maintain.
pub fn validate(prefs: &MoviePreferences) -> Result<(), PreferenceError> {
    if let Some(id) = prefs.liked.intersection(&prefs.disliked).next() {
        return Err(PreferenceError::LikedAndDisliked(*id));
    }
    if let Some(id) = prefs.liked.union(&prefs.disliked).find(|id| !prefs.watched.contains(id)) {
        return Err(PreferenceError::RatedUnwatched(*id));
    }
    if let Some(id) = prefs.rewatch.difference(&prefs.watched).next() {
        return Err(PreferenceError::RewatchNotWatched(*id));
    }
    if let Some(id) = prefs.watchlist.intersection(&prefs.watched).next() {
        return Err(PreferenceError::WatchedOnWatchlist(*id));
    }
    if let Some(id) = prefs.watchlist.intersection(&prefs.blocked).next() {
        return Err(PreferenceError::BlockedOnWatchlist(*id));
    }
    if let Some(id) = prefs.rewatch.intersection(&prefs.blocked).next() {
        return Err(PreferenceError::BlockedRewatch(*id));
    }
    Ok(())
}
