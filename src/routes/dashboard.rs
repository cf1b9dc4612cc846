//! Dashboard routes (internal listener)
//!
//! - GET    /dashboard/entries      - Caller's entries
//! - POST   /dashboard/entries      - Create an entry owned by the caller
//! - GET    /dashboard/entries/{id} - One of the caller's entries
//! - DELETE /dashboard/entries/{id} - Delete one of the caller's entries
//!
//! The caller is whoever the gateway's assertion headers name. Requests
//! without an assertion fail with `InternalTrustViolation`.

use bytes::Bytes;
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use uuid::Uuid;

use super::response::{error_response, json_response, method_not_allowed, no_content, not_found, BoxBody};
use crate::dashboard::{Entry, EntryStore, IdentityContext, NewEntry};
use crate::types::LintelError;

const ENTRIES_PATH: &str = "/dashboard/entries";

#[derive(Debug, Serialize)]
pub struct EntryList {
    pub owner: Uuid,
    pub entries: Vec<Entry>,
}

fn entry_not_found(id: &str) -> LintelError {
    LintelError::NotFound(format!("Entry {id}"))
}

pub async fn handle_dashboard_request(req: Request<Bytes>, store: &EntryStore) -> Response<BoxBody> {
    let path = req.uri().path().to_string();

    let caller = match IdentityContext::from_headers(req.headers(), &path) {
        Ok(caller) => caller,
        Err(e) => return error_response(&e.into()),
    };

    let result = match path.strip_prefix(ENTRIES_PATH) {
        Some("") | Some("/") => match *req.method() {
            Method::GET => Ok(json_response(
                StatusCode::OK,
                &EntryList {
                    owner: caller.subject,
                    entries: store.list(&caller),
                },
            )),
            Method::POST => create_entry(&req, store, &caller),
            _ => return method_not_allowed(),
        },
        Some(rest) if rest.starts_with('/') && !rest[1..].contains('/') => {
            let id = &rest[1..];
            match *req.method() {
                Method::GET => Uuid::parse_str(id)
                    .ok()
                    .and_then(|id| store.get(&caller, id))
                    .map(|entry| json_response(StatusCode::OK, &entry))
                    .ok_or_else(|| entry_not_found(id)),
                Method::DELETE => match Uuid::parse_str(id) {
                    Ok(uuid) if store.delete(&caller, uuid) => Ok(no_content()),
                    _ => Err(entry_not_found(id)),
                },
                _ => return method_not_allowed(),
            }
        }
        _ => return not_found(&path),
    };

    result.unwrap_or_else(|e| error_response(&e))
}

fn create_entry(
    req: &Request<Bytes>,
    store: &EntryStore,
    caller: &IdentityContext,
) -> Result<Response<BoxBody>, LintelError> {
    let new: NewEntry = serde_json::from_slice(req.body())
        .map_err(|e| LintelError::BadRequest(format!("Invalid JSON body: {}", e)))?;
    let entry = store.create(caller, new)?;
    Ok(json_response(StatusCode::CREATED, &entry))
}
