use crate::policy::{Role, Viewer};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The signed-in user as stored in the durable session file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub full_name: String,
}

impl SessionUser {
    pub fn viewer(&self) -> Viewer {
        Viewer::new(self.id.clone(), self.role)
    }
}

/// Session lifecycle: `Loading` until a workspace is selected and the durable
/// store has been read, then `Anonymous` or `Authenticated`. Consumers must
/// treat `Loading` as its own state, never as signed-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Loading,
    Anonymous,
    Authenticated(SessionUser),
}

impl Session {
    pub fn state_label(&self) -> &'static str {
        match self {
            Session::Loading => "loading",
            Session::Anonymous => "anonymous",
            Session::Authenticated(_) => "authenticated",
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            Session::Authenticated(u) => Some(u),
            _ => None,
        }
    }
}

fn session_file(workspace: &Path) -> PathBuf {
    workspace.join("session.json")
}

/// Read the durable store once. A missing or unreadable file means no saved
/// session.
pub fn hydrate(workspace: &Path) -> Session {
    let path = session_file(workspace);
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return Session::Anonymous;
    };
    match serde_json::from_str::<SessionUser>(&raw) {
        Ok(user) => Session::Authenticated(user),
        Err(_) => Session::Anonymous,
    }
}

pub fn persist(workspace: &Path, user: &SessionUser) -> anyhow::Result<()> {
    let path = session_file(workspace);
    std::fs::write(&path, serde_json::to_string(user)?)?;
    Ok(())
}

pub fn clear(workspace: &Path) -> anyhow::Result<()> {
    let path = session_file(workspace);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub enum SignInError {
    /// No account with that email in the directory.
    NotFound,
    /// Email exists but the password does not match its expected value.
    InvalidCredentials,
    Db(anyhow::Error),
}

/// Look the email up in the fixed account directory and check the per-email
/// password. No hashing: the directory is a demonstration fixture.
pub fn sign_in(conn: &Connection, email: &str, password: &str) -> Result<SessionUser, SignInError> {
    let row = conn
        .query_row(
            "SELECT id, email, password, role, full_name FROM users WHERE email = ?",
            [email],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            },
        )
        .optional()
        .map_err(|e| SignInError::Db(e.into()))?;

    let Some((id, email, expected_password, role_raw, full_name)) = row else {
        return Err(SignInError::NotFound);
    };
    if expected_password != password {
        return Err(SignInError::InvalidCredentials);
    }
    let role = Role::parse(&role_raw).ok_or_else(|| {
        SignInError::Db(anyhow::anyhow!("unknown role in directory: {}", role_raw))
    })?;
    Ok(SessionUser {
        id,
        email,
        role,
        full_name,
    })
}
