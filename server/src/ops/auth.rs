//! Login and the three-step signup handshake.
//!
//! Signup: start (email) → verify (code) → finalize (username + password).
//! Each step answers with `{ok, message}` or `{ok: false, error}`.

use tracing::{info, warn};

use crate::channel::Outbound;
use crate::credentials::{hash_password, verify_password};
use crate::error::Rejection;
use crate::fanout;
use crate::ledger::generate_code;
use crate::protocol::MsgKind;
use crate::session::Session;
use crate::state::AppState;
use crate::types::{
    AuthReply, LoginAccepted, LoginRequest, SetCredentialsRequest, SignupEmailRequest,
    VerifyEmailRequest,
};

use super::outcome;

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ═══════════════════════════════════════════════════════════════
// Login
// ═══════════════════════════════════════════════════════════════

/// On success the caller gets three frames in order: login ack (with its
/// groups), friend snapshot, server info.
pub async fn login(state: &AppState, session: &mut Session, req: LoginRequest) {
    let username = match authenticate(state, &req).await {
        Ok(username) => username,
        Err(rejection) => {
            info!(conn = %session.conn_id(), username = %req.username.trim(), "login rejected: {rejection}");
            let reply = AuthReply::from_result(Err(rejection.to_string()));
            fanout::reply(session.out(), MsgKind::LoginResponse, &reply).await;
            return;
        }
    };

    session.login(state, &username);

    let groups = state.store.user_groups(&username).await.unwrap_or_else(|e| {
        warn!(identity = %username, "group lookup failed at login: {e}");
        Vec::new()
    });
    let out = session.out();
    let ack = LoginAccepted {
        ok: true,
        username: username.clone(),
        groups,
    };
    fanout::reply(out, MsgKind::LoginResponse, &ack).await;
    fanout::send_friend_snapshot(state, &username, out).await;
    fanout::send_server_info(state, &username, out).await;

    info!(identity = %username, conn = %session.conn_id(), peer = %session.peer(), "logged in");
}

pub async fn authenticate(state: &AppState, req: &LoginRequest) -> Result<String, Rejection> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(Rejection::MissingCredentials);
    }
    let user = state
        .store
        .user_by_username(username)
        .await?
        .ok_or(Rejection::UnknownUser)?;
    if !verify_password(&req.password, &user.password_hash) {
        return Err(Rejection::InvalidPassword);
    }
    Ok(user.username)
}

// ═══════════════════════════════════════════════════════════════
// Signup
// ═══════════════════════════════════════════════════════════════

pub async fn signup_start(state: &AppState, out: &Outbound, req: SignupEmailRequest) {
    let result = begin_signup(state, &req.email).await;
    let reply = AuthReply::from_result(outcome(&result));
    fanout::reply(out, MsgKind::SignupEmailResponse, &reply).await;
}

pub async fn signup_verify(state: &AppState, out: &Outbound, req: VerifyEmailRequest) {
    let email = normalize_email(&req.email);
    let result = state
        .ledger
        .verify(&email, req.code.trim())
        .map(|()| "Email verified".to_owned());
    if result.is_ok() {
        info!(email = %email, "signup email verified");
    }
    let reply = AuthReply::from_result(outcome(&result));
    fanout::reply(out, MsgKind::VerifyEmailResponse, &reply).await;
}

pub async fn signup_finalize(state: &AppState, out: &Outbound, req: SetCredentialsRequest) {
    let result = finalize_account(state, &req).await;
    let reply = AuthReply::from_result(outcome(&result));
    fanout::reply(out, MsgKind::SetCredentialsResponse, &reply).await;
}

/// Issue a code for `raw_email` and hand it to the delivery channel.
pub async fn begin_signup(state: &AppState, raw_email: &str) -> Result<String, Rejection> {
    let email = normalize_email(raw_email);
    if email.is_empty() || !email.contains('@') {
        return Err(Rejection::InvalidEmail);
    }
    if state.store.user_by_email(&email).await?.is_some() {
        return Err(Rejection::EmailInUse);
    }

    let code = generate_code();
    state.ledger.issue(&email, &code);
    state.delivery.deliver(&email, &code).await;
    info!(email = %email, "signup started");
    Ok("Verification code sent".into())
}

/// Create the account for a verified email and drop its ledger entry.
/// Refusals before the insert (unverified, missing fields, username taken)
/// leave the entry in place so the user can retry. Once the insert is
/// attempted the entry is gone either way.
pub async fn finalize_account(
    state: &AppState,
    req: &SetCredentialsRequest,
) -> Result<String, Rejection> {
    let email = normalize_email(&req.email);
    let username = req.username.trim();

    if !state.ledger.is_verified(&email) {
        return Err(Rejection::NotVerified);
    }
    if username.is_empty() || req.password.is_empty() {
        return Err(Rejection::MissingCredentials);
    }
    if state.store.user_by_username(username).await?.is_some() {
        return Err(Rejection::UsernameTaken);
    }
    let created = state
        .store
        .create_user(&email, username, &hash_password(&req.password))
        .await;
    state.ledger.consume(&email);
    if !created? {
        return Err(Rejection::AccountNotCreated);
    }

    info!(identity = %username, email = %email, "account created");
    Ok("Account created".into())
}
