use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::session::{self, Session, SessionUser};
use serde_json::json;

fn user_json(user: &SessionUser) -> serde_json::Value {
    json!({
        "id": user.id,
        "email": user.email,
        "role": user.role.as_str(),
        "fullName": user.full_name
    })
}

fn handle_sign_in(state: &mut AppState, req: &Request) -> serde_json::Value {
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    match session::sign_in(conn, &email, &password) {
        Ok(user) => {
            if let Some(ws) = state.workspace.as_ref() {
                if let Err(e) = session::persist(ws, &user) {
                    return err(&req.id, "session_store_failed", format!("{e:?}"), None);
                }
            }
            let result = json!({ "user": user_json(&user) });
            state.session = Session::Authenticated(user);
            ok(&req.id, result)
        }
        Err(session::SignInError::NotFound) => {
            err(&req.id, "not_found", "Usuario no encontrado", None)
        }
        Err(session::SignInError::InvalidCredentials) => {
            err(&req.id, "invalid_credentials", "Contraseña incorrecta", None)
        }
        Err(session::SignInError::Db(e)) => {
            err(&req.id, "db_query_failed", format!("{e:?}"), None)
        }
    }
}

fn handle_sign_out(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(ws) = state.workspace.as_ref() {
        if let Err(e) = session::clear(ws) {
            return err(&req.id, "session_store_failed", format!("{e:?}"), None);
        }
    }
    state.session = Session::Anonymous;
    ok(&req.id, json!({ "session": state.session.state_label() }))
}

fn handle_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user = state.session.user().map(user_json);
    ok(
        &req.id,
        json!({
            "state": state.session.state_label(),
            "user": user
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.signIn" => Some(handle_sign_in(state, req)),
        "auth.signOut" => Some(handle_sign_out(state, req)),
        "auth.current" => Some(handle_current(state, req)),
        _ => None,
    }
}
