//! In-memory identity store used by tests.
//!
//! Records the calls the workflow makes and can be told to refuse or fault
//! the next role assignment or deletion.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::account::{
    AccountQuery, INVALID_TOKEN, IdentityResult, PASSWORD_MISMATCH, Role,
    RoleMembership, RoleStore, User, UserStore, already_in_role,
    duplicate_role_name, duplicate_user_name, not_in_role, unknown_role,
    unknown_user, validate_password, validate_role_name, validate_user,
};
use crate::config::PasswordPolicy;
use crate::error::{Result, ServerError};
use crate::paging::Pagination;

/// Injected failure for the next matching call.
#[derive(Debug, Clone)]
pub enum Failure {
    /// Answer with these identity errors.
    Refuse(Vec<String>),
    /// Answer with a store fault.
    Fault,
}

impl Failure {
    fn outcome(self) -> Result<IdentityResult> {
        match self {
            Failure::Refuse(errors) => Ok(IdentityResult::failed(errors)),
            Failure::Fault => Err(ServerError::internal("injected store fault")),
        }
    }
}

/// Calls received by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calls {
    pub add_to_roles: Vec<Vec<String>>,
    pub remove_from_roles: Vec<Vec<String>>,
    pub access_failed: usize,
    pub deleted: Vec<String>,
}

#[derive(Default)]
struct State {
    users: Vec<User>,
    passwords: HashMap<String, String>,
    roles: Vec<Role>,
    memberships: Vec<RoleMembership>,
    reset_tokens: HashMap<String, String>,
    sequence: u64,
}

impl State {
    fn next(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{}", self.sequence)
    }

    fn user_by_name(&self, user_name: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.user_name.eq_ignore_ascii_case(user_name))
    }

    fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Roles ordered by name, as the database returns them.
    fn sorted_roles(&self) -> Vec<&Role> {
        let mut roles: Vec<&Role> = self.roles.iter().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        roles
    }

    fn is_member(&self, user_id: &str, role_id: &str) -> bool {
        self.memberships
            .iter()
            .any(|m| m.user_id == user_id && m.role_id == role_id)
    }

    fn with_memberships(&self, mut user: User) -> User {
        user.roles = self
            .memberships
            .iter()
            .filter(|m| m.user_id == user.id)
            .cloned()
            .collect();
        user
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    calls: Mutex<Calls>,
    policy: PasswordPolicy,
    lockout: bool,
    fail_add_to_roles: Mutex<Option<Failure>>,
    fail_delete: Mutex<Option<Failure>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            calls: Mutex::new(Calls::default()),
            policy: PasswordPolicy::default(),
            lockout: true,
            fail_add_to_roles: Mutex::new(None),
            fail_delete: Mutex::new(None),
        }
    }

    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_lockout(mut self, enabled: bool) -> Self {
        self.lockout = enabled;
        self
    }

    /// Insert roles directly.
    pub fn with_roles(self, names: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for name in names {
                let id = state.next("role");
                state.roles.push(Role {
                    id,
                    name: name.to_string(),
                });
            }
        }
        self
    }

    pub fn fail_next_add_to_roles(&self, failure: Failure) {
        *self.fail_add_to_roles.lock().unwrap() = Some(failure);
    }

    pub fn fail_next_delete(&self, failure: Failure) {
        *self.fail_delete.lock().unwrap() = Some(failure);
    }

    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    pub fn contains_user(&self, user_name: &str) -> bool {
        self.state.lock().unwrap().user_by_name(user_name).is_some()
    }

    pub fn access_failed_count(&self, user_name: &str) -> i32 {
        self.state
            .lock()
            .unwrap()
            .user_by_name(user_name)
            .map_or(0, |u| u.access_failed_count)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        user: &User,
        password: &str,
    ) -> Result<IdentityResult> {
        let mut state = self.state.lock().unwrap();

        let mut errors = validate_user(user);
        if state.user_by_name(&user.user_name).is_some() {
            errors.push(duplicate_user_name(&user.user_name));
        }
        errors.extend(validate_password(&self.policy, password));
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        let mut created = user.clone();
        created.id = state.next("user");
        created.roles.clear();
        state.passwords.insert(created.id.clone(), password.to_owned());
        state.users.push(created);

        Ok(IdentityResult::success())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_name(&self, user_name: &str) -> Result<Option<User>> {
        Ok(self.state.lock().unwrap().user_by_name(user_name).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<IdentityResult> {
        let mut state = self.state.lock().unwrap();

        let mut errors = validate_user(user);
        if state
            .user_by_name(&user.user_name)
            .is_some_and(|other| other.id != user.id)
        {
            errors.push(duplicate_user_name(&user.user_name));
        }
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        let Some(stored) = state.users.iter_mut().find(|u| u.id == user.id)
        else {
            return Ok(IdentityResult::failed(vec![unknown_user(&user.id)]));
        };
        stored.user_name = user.user_name.clone();
        stored.email = user.email.clone();
        stored.email_confirmed = user.email_confirmed;
        stored.phone_number = user.phone_number.clone();
        stored.job_title = user.job_title.clone();
        stored.manager_id = user.manager_id.clone();

        Ok(IdentityResult::success())
    }

    async fn delete_user(&self, user: &User) -> Result<IdentityResult> {
        self.calls.lock().unwrap().deleted.push(user.id.clone());
        if let Some(failure) = self.fail_delete.lock().unwrap().take() {
            return failure.outcome();
        }

        let mut state = self.state.lock().unwrap();
        if !state.users.iter().any(|u| u.id == user.id) {
            return Ok(IdentityResult::failed(vec![unknown_user(&user.id)]));
        }

        state.users.retain(|u| u.id != user.id);
        state.memberships.retain(|m| m.user_id != user.id);
        state.passwords.remove(&user.id);
        for subordinate in state
            .users
            .iter_mut()
            .filter(|u| u.manager_id.as_deref() == Some(user.id.as_str()))
        {
            subordinate.manager_id = None;
        }

        Ok(IdentityResult::success())
    }

    async fn check_password(&self, user: &User, password: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let matches =
            state.passwords.get(&user.id).is_some_and(|p| p == password);

        if self.lockout {
            let now = Utc::now();
            let Some(stored) = state.users.iter_mut().find(|u| u.id == user.id)
            else {
                return Ok(false);
            };
            if stored.is_locked_out(now) {
                return Ok(false);
            }
            if matches {
                stored.access_failed_count = 0;
            } else {
                stored.access_failed_count += 1;
            }
        }

        Ok(matches)
    }

    fn supports_user_lockout(&self) -> bool {
        self.lockout
    }

    async fn access_failed(&self, user: &User) -> Result<IdentityResult> {
        self.calls.lock().unwrap().access_failed += 1;

        let mut state = self.state.lock().unwrap();
        if let Some(stored) = state.users.iter_mut().find(|u| u.id == user.id) {
            stored.access_failed_count += 1;
        }

        Ok(IdentityResult::success())
    }

    async fn generate_password_reset_token(&self, user: &User) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let token = state.next("token");
        state.reset_tokens.insert(token.clone(), user.id.clone());
        Ok(token)
    }

    async fn reset_password(
        &self,
        user: &User,
        token: &str,
        new_password: &str,
    ) -> Result<IdentityResult> {
        let mut state = self.state.lock().unwrap();

        if state.reset_tokens.get(token) != Some(&user.id) {
            return Ok(IdentityResult::failed(vec![INVALID_TOKEN.into()]));
        }
        let errors = validate_password(&self.policy, new_password);
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        state.reset_tokens.remove(token);
        state.passwords.insert(user.id.clone(), new_password.to_owned());
        Ok(IdentityResult::success())
    }

    async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<IdentityResult> {
        let mut state = self.state.lock().unwrap();

        if state.passwords.get(&user.id).map(String::as_str)
            != Some(current_password)
        {
            return Ok(IdentityResult::failed(vec![PASSWORD_MISMATCH.into()]));
        }
        let errors = validate_password(&self.policy, new_password);
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        state.passwords.insert(user.id.clone(), new_password.to_owned());
        Ok(IdentityResult::success())
    }

    async fn add_to_roles(
        &self,
        user: &User,
        roles: &[String],
    ) -> Result<IdentityResult> {
        self.calls.lock().unwrap().add_to_roles.push(roles.to_vec());
        if let Some(failure) = self.fail_add_to_roles.lock().unwrap().take() {
            return failure.outcome();
        }

        let mut state = self.state.lock().unwrap();
        let mut errors = Vec::new();
        let mut added: Vec<RoleMembership> = Vec::new();
        for name in roles {
            match state.role_by_name(name) {
                None => errors.push(unknown_role(name)),
                Some(role)
                    if state.is_member(&user.id, &role.id)
                        || added.iter().any(|m| m.role_id == role.id) =>
                {
                    errors.push(already_in_role(name))
                },
                Some(role) => added.push(RoleMembership {
                    user_id: user.id.clone(),
                    role_id: role.id.clone(),
                }),
            }
        }
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        state.memberships.extend(added);
        Ok(IdentityResult::success())
    }

    async fn remove_from_roles(
        &self,
        user: &User,
        roles: &[String],
    ) -> Result<IdentityResult> {
        self.calls
            .lock()
            .unwrap()
            .remove_from_roles
            .push(roles.to_vec());

        let mut state = self.state.lock().unwrap();
        let mut errors = Vec::new();
        let mut removed = Vec::new();
        for name in roles {
            match state.role_by_name(name) {
                Some(role) if state.is_member(&user.id, &role.id) => {
                    removed.push(role.id.clone())
                },
                _ => errors.push(not_in_role(name)),
            }
        }
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        state
            .memberships
            .retain(|m| m.user_id != user.id || !removed.contains(&m.role_id));
        Ok(IdentityResult::success())
    }

    async fn get_roles(&self, user: &User) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sorted_roles()
            .into_iter()
            .filter(|r| state.is_member(&user.id, &r.id))
            .map(|r| r.name.clone())
            .collect())
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn create_role(&self, role: &Role) -> Result<IdentityResult> {
        let mut state = self.state.lock().unwrap();

        let mut errors = validate_role_name(&role.name);
        if state.role_by_name(&role.name).is_some() {
            errors.push(duplicate_role_name(&role.name));
        }
        if !errors.is_empty() {
            return Ok(IdentityResult::failed(errors));
        }

        let id = state.next("role");
        state.roles.push(Role {
            id,
            name: role.name.clone(),
        });
        Ok(IdentityResult::success())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        Ok(self.state.lock().unwrap().role_by_name(name).cloned())
    }

    async fn find_role_by_id(&self, id: &str) -> Result<Option<Role>> {
        let state = self.state.lock().unwrap();
        Ok(state.roles.iter().find(|r| r.id == id).cloned())
    }

    async fn roles(&self) -> Result<Vec<Role>> {
        let state = self.state.lock().unwrap();
        Ok(state.sorted_roles().into_iter().cloned().collect())
    }
}

#[async_trait]
impl AccountQuery for MemoryStore {
    async fn user_by_id(&self, id: &str) -> Result<Option<User>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .map(|u| state.with_memberships(u)))
    }

    async fn role_names_by_ids(&self, ids: &[String]) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sorted_roles()
            .into_iter()
            .filter(|r| ids.contains(&r.id))
            .map(|r| r.name.clone())
            .collect())
    }

    async fn users_ordered_by_name(
        &self,
        pagination: Pagination,
    ) -> Result<Vec<User>> {
        let state = self.state.lock().unwrap();
        let mut users = state.users.clone();
        users.sort_by(|a, b| a.user_name.cmp(&b.user_name));

        Ok(pagination
            .apply(users)
            .into_iter()
            .map(|u| state.with_memberships(u))
            .collect())
    }

    async fn roles_by_ids(&self, ids: &[String]) -> Result<Vec<Role>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sorted_roles()
            .into_iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect())
    }

    async fn subordinates(&self, manager_id: &str) -> Result<Vec<User>> {
        let state = self.state.lock().unwrap();
        let mut users: Vec<User> = state
            .users
            .iter()
            .filter(|u| u.manager_id.as_deref() == Some(manager_id))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.user_name.cmp(&b.user_name));
        Ok(users)
    }

    async fn any_users(&self) -> Result<bool> {
        Ok(!self.state.lock().unwrap().users.is_empty())
    }
}
