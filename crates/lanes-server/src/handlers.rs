//! RPC method handlers.

use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;
use tracing::error;

use lanes_core::{NewTodo, PositionUpdate, Priority, TodoId, TodoPatch};
use lanes_store::{Database, SessionRepo, StoreError, UserRepo};

use crate::actions::{ActionConfig, ActionError, ActionResult, Caller, TodoActions};
use crate::compat;
use crate::rpc::{self, RpcResponse};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub db: Database,
    pub actions: TodoActions,
    pub users: UserRepo,
    pub sessions: SessionRepo,
}

impl HandlerState {
    pub fn new(db: Database, config: ActionConfig) -> Self {
        Self {
            actions: TodoActions::new(db.clone(), config),
            users: UserRepo::new(db.clone()),
            sessions: SessionRepo::new(db.clone()),
            db,
        }
    }

    /// Resolve an optional bearer token to a caller. Unknown or expired
    /// tokens are anonymous.
    pub fn authenticate(&self, token: Option<&SecretString>) -> Result<Caller, StoreError> {
        let Some(token) = token else {
            return Ok(Caller::Anonymous);
        };
        Ok(self
            .sessions
            .resolve(token)?
            .map_or(Caller::Anonymous, Caller::User))
    }
}

/// The authenticated side of one request.
#[derive(Debug, Default)]
pub struct RequestAuth {
    pub caller: Caller,
    /// The bearer token as presented, kept for `auth.signOut`.
    pub token: Option<SecretString>,
}

/// Dispatch an RPC method to the appropriate handler.
///
/// Params are normalized to camelCase keys before routing.
pub async fn dispatch(
    state: &Arc<HandlerState>,
    auth: &RequestAuth,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let params = compat::normalize_params(params);
    let caller = &auth.caller;

    match method {
        // Todos
        "todos.list" => respond(id, state.actions.list(caller)),
        "todos.board" => respond(id, state.actions.board(caller)),
        "todos.create" => todos_create(state, caller, &params, id),
        "todos.update" => todos_update(state, caller, &params, id),
        "todos.delete" => todos_delete(state, caller, &params, id),
        "todos.reorder" => todos_reorder(state, caller, &params, id),
        "todos.move" => todos_move(state, caller, &params, id),

        // Auth
        "auth.session" => auth_session(state, caller, id),
        "auth.signOut" => auth_sign_out(state, auth, id),

        // System
        "system.ping" | "health" => health(state, id),

        _ => RpcResponse::method_not_found(id, method),
    }
}

/// Turn an action result into a response. `None` and unit serialize as a
/// `null` result.
fn respond<T: Serialize>(id: Option<serde_json::Value>, result: ActionResult<T>) -> RpcResponse {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(json) => RpcResponse::success(id, json),
            Err(e) => RpcResponse::internal_error(id, e.to_string()),
        },
        Err(ActionError::Validation(msg)) => RpcResponse::invalid_params(id, msg),
        Err(ActionError::Store(e)) => {
            error!(error = %e, "store failure");
            RpcResponse::internal_error(id, e.to_string())
        }
    }
}

// ── Todo handlers ──

fn todos_create(
    state: &Arc<HandlerState>,
    caller: &Caller,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let input: NewTodo = match rpc::parse(params) {
        Ok(input) => input,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    respond(id, state.actions.create(caller, input))
}

fn todos_update(
    state: &Arc<HandlerState>,
    caller: &Caller,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let todo_id = match rpc::require_str(params, "id") {
        Ok(s) => TodoId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let patch: TodoPatch = match rpc::parse(params) {
        Ok(patch) => patch,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    respond(id, state.actions.update(caller, &todo_id, patch))
}

fn todos_delete(
    state: &Arc<HandlerState>,
    caller: &Caller,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let todo_id = match rpc::require_str(params, "id") {
        Ok(s) => TodoId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    respond(id, state.actions.delete(caller, &todo_id).map(|_| ()))
}

fn todos_reorder(
    state: &Arc<HandlerState>,
    caller: &Caller,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(items) = params.get("items") else {
        return RpcResponse::invalid_params(id, "Missing required parameter: items");
    };
    let items: Vec<PositionUpdate> = match rpc::parse(items) {
        Ok(items) => items,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    respond(id, state.actions.reorder(caller, &items).map(|_| ()))
}

fn todos_move(
    state: &Arc<HandlerState>,
    caller: &Caller,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let todo_id = match rpc::require_str(params, "id") {
        Ok(s) => TodoId::from_raw(s),
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let priority: Priority = match rpc::require_str(params, "priority").and_then(|p| p.parse()) {
        Ok(p) => p,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    let index = match rpc::require_i64(params, "index") {
        Ok(i) => i,
        Err(e) => return RpcResponse::invalid_params(id, e),
    };
    respond(id, state.actions.move_todo(caller, &todo_id, priority, index))
}

// ── Auth handlers ──

fn auth_session(
    state: &Arc<HandlerState>,
    caller: &Caller,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let Some(user_id) = caller.user_id() else {
        return RpcResponse::success(id, serde_json::Value::Null);
    };
    match state.users.get(user_id) {
        Ok(Some(user)) => RpcResponse::success(id, serde_json::json!({ "user": user })),
        Ok(None) => RpcResponse::success(id, serde_json::Value::Null),
        Err(e) => {
            error!(error = %e, "session lookup failed");
            RpcResponse::internal_error(id, e.to_string())
        }
    }
}

fn auth_sign_out(
    state: &Arc<HandlerState>,
    auth: &RequestAuth,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    if let Some(token) = &auth.token {
        if let Err(e) = state.sessions.revoke(token) {
            error!(error = %e, "sign-out failed");
            return RpcResponse::internal_error(id, e.to_string());
        }
    }
    RpcResponse::success(id, serde_json::Value::Null)
}

// ── System handlers ──

fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let db_ok = state
        .db
        .with_conn(|conn| {
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
            Ok(one == 1)
        })
        .unwrap_or(false);

    RpcResponse::success(
        id,
        serde_json::json!({
            "status": if db_ok { "healthy" } else { "degraded" },
            "components": {
                "database": if db_ok { "ok" } else { "error" },
            },
        }),
    )
}
