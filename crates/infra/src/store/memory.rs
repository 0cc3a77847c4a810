use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use devbook_core::{
    NewUserRecord, PasswordDigest, Publication, PublicationDraft, PublicationEdit, PublicationId,
    User, UserId, UserProfile,
};

use super::{PublicationStore, StoreError, StoreResult, UserStore};

#[derive(Debug, Clone)]
struct UserRow {
    user: User,
    password: PasswordDigest,
}

#[derive(Debug, Default)]
struct State {
    last_user_id: u64,
    last_publication_id: u64,
    users: BTreeMap<UserId, UserRow>,
    /// `author_nick` is refreshed from `users` on every read.
    publications: BTreeMap<PublicationId, Publication>,
    /// (followee, follower)
    follows: BTreeSet<(UserId, UserId)>,
}

impl State {
    fn ensure_unique(&self, nick: &str, email: &str, except: Option<UserId>) -> StoreResult<()> {
        for row in self.users.values() {
            if Some(row.user.id) == except {
                continue;
            }
            if row.user.nick == nick {
                return Err(StoreError::Conflict(format!("nick '{nick}' is already taken")));
            }
            if row.user.email == email {
                return Err(StoreError::Conflict(format!("email '{email}' is already taken")));
            }
        }
        Ok(())
    }

    fn users_where(&self, mut keep: impl FnMut(UserId) -> bool) -> Vec<User> {
        self.users
            .values()
            .filter(|row| keep(row.user.id))
            .map(|row| row.user.clone())
            .collect()
    }

    fn joined(&self, publication: &Publication) -> Publication {
        let mut p = publication.clone();
        if let Some(author) = self.users.get(&p.author_id) {
            p.author_nick = author.user.nick.clone();
        }
        p
    }

    fn publications_where(&self, keep: impl Fn(&Publication) -> bool) -> Vec<Publication> {
        self.publications
            .values()
            .rev()
            .filter(|p| keep(*p))
            .map(|p| self.joined(p))
            .collect()
    }

    fn publication_mut(&mut self, id: PublicationId) -> StoreResult<&mut Publication> {
        self.publications.get_mut(&id).ok_or(StoreError::NotFound)
    }
}

/// Process-local store for tests and development.
///
/// All state sits behind one `RwLock`; no guard is held across an `.await`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Database("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create(&self, record: NewUserRecord) -> StoreResult<User> {
        let mut state = self.write()?;
        let profile = &record.profile;
        state.ensure_unique(profile.nick(), profile.email(), None)?;

        state.last_user_id += 1;
        let user = User {
            id: UserId::new(state.last_user_id),
            name: profile.name().to_string(),
            nick: profile.nick().to_string(),
            email: profile.email().to_string(),
            created_at: Utc::now(),
        };
        state.users.insert(
            user.id,
            UserRow {
                user: user.clone(),
                password: record.password_hash,
            },
        );
        Ok(user)
    }

    async fn search(&self, filter: &str) -> StoreResult<Vec<User>> {
        let needle = filter.to_lowercase();
        let state = self.read()?;
        Ok(state
            .users
            .values()
            .filter(|row| {
                row.user.name.to_lowercase().contains(&needle)
                    || row.user.nick.to_lowercase().contains(&needle)
            })
            .map(|row| row.user.clone())
            .collect())
    }

    async fn get(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).map(|row| row.user.clone()))
    }

    async fn update(&self, id: UserId, profile: &UserProfile) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.users.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        state.ensure_unique(profile.nick(), profile.email(), Some(id))?;

        let row = state.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        row.user.name = profile.name().to_string();
        row.user.nick = profile.nick().to_string();
        row.user.email = profile.email().to_string();
        Ok(())
    }

    async fn delete(&self, id: UserId) -> StoreResult<()> {
        let mut state = self.write()?;
        state.users.remove(&id).ok_or(StoreError::NotFound)?;
        state.publications.retain(|_, p| p.author_id != id);
        state
            .follows
            .retain(|(followee, follower)| *followee != id && *follower != id);
        Ok(())
    }

    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> StoreResult<Option<(UserId, PasswordDigest)>> {
        let state = self.read()?;
        Ok(state
            .users
            .values()
            .find(|row| row.user.email == email)
            .map(|row| (row.user.id, row.password.clone())))
    }

    async fn password_digest(&self, id: UserId) -> StoreResult<Option<PasswordDigest>> {
        Ok(self.read()?.users.get(&id).map(|row| row.password.clone()))
    }

    async fn update_password(&self, id: UserId, digest: &PasswordDigest) -> StoreResult<()> {
        let mut state = self.write()?;
        let row = state.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        row.password = digest.clone();
        Ok(())
    }

    async fn follow(&self, followee: UserId, follower: UserId) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.users.contains_key(&followee) || !state.users.contains_key(&follower) {
            return Err(StoreError::NotFound);
        }
        state.follows.insert((followee, follower));
        Ok(())
    }

    async fn unfollow(&self, followee: UserId, follower: UserId) -> StoreResult<()> {
        self.write()?.follows.remove(&(followee, follower));
        Ok(())
    }

    async fn followers(&self, id: UserId) -> StoreResult<Vec<User>> {
        let state = self.read()?;
        Ok(state.users_where(|candidate| state.follows.contains(&(id, candidate))))
    }

    async fn following(&self, id: UserId) -> StoreResult<Vec<User>> {
        let state = self.read()?;
        Ok(state.users_where(|candidate| state.follows.contains(&(candidate, id))))
    }
}

#[async_trait]
impl PublicationStore for InMemoryStore {
    async fn create(&self, draft: PublicationDraft) -> StoreResult<Publication> {
        let mut state = self.write()?;
        let author_nick = state
            .users
            .get(&draft.author_id)
            .map(|row| row.user.nick.clone())
            .ok_or(StoreError::NotFound)?;

        state.last_publication_id += 1;
        let publication = Publication {
            id: PublicationId::new(state.last_publication_id),
            title: draft.title,
            content: draft.content,
            author_id: draft.author_id,
            author_nick,
            likes: 0,
            created_at: Utc::now(),
        };
        state.publications.insert(publication.id, publication.clone());
        Ok(publication)
    }

    async fn get(&self, id: PublicationId) -> StoreResult<Option<Publication>> {
        let state = self.read()?;
        Ok(state.publications.get(&id).map(|p| state.joined(p)))
    }

    async fn feed(&self, user: UserId) -> StoreResult<Vec<Publication>> {
        let state = self.read()?;
        Ok(state.publications_where(|p| {
            p.author_id == user || state.follows.contains(&(p.author_id, user))
        }))
    }

    async fn by_author(&self, author: UserId) -> StoreResult<Vec<Publication>> {
        let state = self.read()?;
        Ok(state.publications_where(|p| p.author_id == author))
    }

    async fn update(&self, id: PublicationId, edit: &PublicationEdit) -> StoreResult<()> {
        let mut state = self.write()?;
        let publication = state.publication_mut(id)?;
        publication.title = edit.title.clone();
        publication.content = edit.content.clone();
        Ok(())
    }

    async fn delete(&self, id: PublicationId) -> StoreResult<()> {
        self.write()?
            .publications
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn like(&self, id: PublicationId) -> StoreResult<()> {
        self.write()?.publication_mut(id)?.like();
        Ok(())
    }

    async fn unlike(&self, id: PublicationId) -> StoreResult<()> {
        self.write()?.publication_mut(id)?.unlike();
        Ok(())
    }
}
