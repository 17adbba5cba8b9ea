//! WebHDFS REST client.
//!
//! Implements [`RemoteStore`] over the WebHDFS HTTP API using a blocking
//! `reqwest` client. Redirects are handled by hand: `CREATE` and `OPEN` are
//! answered by the NameNode with a `307` pointing at a DataNode, and the
//! `CREATE` payload must only be sent to that second location.
//!
//! # Authentication
//!
//! - [`Auth::Simple`] appends `user.name=<user>` (pseudo authentication).
//! - [`Auth::Delegation`] appends `delegation=<token>`, the way clients reach
//!   a Kerberos-secured cluster once a delegation token has been obtained
//!   out of band (e.g. `hdfs fetchdt`).

use crate::error::{RemoteError, RemoteResult};
use crate::stat::{Permission, RemoteStat};
use crate::store::RemoteStore;
use bytes::Bytes;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

/// REST prefix shared by every WebHDFS operation.
const API_PREFIX: &str = "/webhdfs/v1";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Authentication mode for WebHDFS requests.
#[derive(Clone)]
pub enum Auth {
    /// Pseudo authentication; `None` lets the server pick the default user.
    Simple {
        /// Value of the `user.name` parameter.
        user: Option<String>,
    },
    /// Kerberos-secured cluster reached through a delegation token.
    Delegation {
        /// Encoded delegation token.
        token: String,
    },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Simple { user } => f.debug_struct("Simple").field("user", user).finish(),
            Auth::Delegation { .. } => f
                .debug_struct("Delegation")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileStatusResponse {
    file_status: RemoteStat,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListStatusResponse {
    file_statuses: FileStatuses,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FileStatuses {
    file_status: Vec<RemoteStat>,
}

#[derive(Deserialize)]
struct BooleanResponse {
    boolean: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteExceptionBody {
    remote_exception: RemoteException,
}

#[derive(Deserialize)]
struct RemoteException {
    exception: String,
    #[serde(default)]
    message: String,
}

/// Blocking WebHDFS client.
#[derive(Debug)]
pub struct WebHdfsClient {
    endpoint: Url,
    auth: Auth,
    http: Client,
}

impl WebHdfsClient {
    /// Creates a client for the NameNode HTTP endpoint (e.g. `http://namenode:9870`).
    pub fn new(server: &str, auth: Auth, timeout: Duration) -> RemoteResult<Self> {
        let endpoint =
            Url::parse(server).map_err(|e| RemoteError::Endpoint(format!("{server}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(RemoteError::Endpoint(server.to_string()));
        }
        let http = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            endpoint,
            auth,
            http,
        })
    }

    /// Returns the configured endpoint.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Builds the URL for one operation on one remote path.
    fn op_url(&self, path: &str, op: &str, params: &[(&str, String)]) -> Url {
        let mut url = self.endpoint.clone();
        let base = self.endpoint.path().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        url.set_path(&format!("{base}{API_PREFIX}/{path}"));
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("op", op);
            for (key, value) in params {
                query.append_pair(key, value);
            }
            match &self.auth {
                Auth::Simple { user: Some(user) } => {
                    query.append_pair("user.name", user);
                }
                Auth::Simple { user: None } => {}
                Auth::Delegation { token } => {
                    query.append_pair("delegation", token);
                }
            }
        }
        url
    }

    /// Sends a request and turns non-success statuses into [`RemoteError`]s.
    fn execute(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() || status.is_redirection() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(decode_failure(status, &body))
    }

    /// Returns the DataNode location of a `307` answer, if any.
    fn redirect_target(response: &Response) -> RemoteResult<Option<Url>> {
        if !response.status().is_redirection() {
            return Ok(None);
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RemoteError::Io("redirect without Location header".to_string()))?;
        response
            .url()
            .join(location)
            .map(Some)
            .map_err(|e| RemoteError::Io(format!("bad redirect location {location}: {e}")))
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> RemoteResult<T> {
        let response = self.execute(self.http.get(url))?;
        decode_json(&response.bytes()?)
    }

    fn put_boolean(&self, url: Url) -> RemoteResult<bool> {
        let response = self.execute(self.http.put(url))?;
        let answer: BooleanResponse = decode_json(&response.bytes()?)?;
        Ok(answer.boolean)
    }
}

/// Decodes a JSON body.
fn decode_json<T: DeserializeOwned>(body: &[u8]) -> RemoteResult<T> {
    Ok(serde_json::from_slice(body)?)
}

/// Converts an error response into a [`RemoteError`].
///
/// Prefers the `RemoteException` JSON body; falls back to the HTTP status
/// when the body is not JSON (proxies, gateways).
fn decode_failure(status: StatusCode, body: &str) -> RemoteError {
    if let Ok(parsed) = serde_json::from_str::<RemoteExceptionBody>(body) {
        let exception = parsed.remote_exception;
        return RemoteError::from_exception(&exception.exception, exception.message);
    }
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(body.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::AccessDenied(format!("HTTP {status}: {body}"))
        }
        _ => RemoteError::Remote {
            exception: format!("HTTP {}", status.as_u16()),
            message: body.to_string(),
        },
    }
}

/// Decodes a `LISTSTATUS` body into `(name, status)` pairs.
fn decode_listing(body: &[u8]) -> RemoteResult<Vec<(String, RemoteStat)>> {
    let listing: ListStatusResponse = decode_json(body)?;
    Ok(listing
        .file_statuses
        .file_status
        .into_iter()
        .map(|stat| (stat.path_suffix.clone(), stat))
        .collect())
}

fn millis_param(value: Option<u64>) -> String {
    value.map_or_else(|| "-1".to_string(), |ms| ms.to_string())
}

impl RemoteStore for WebHdfsClient {
    fn status(&self, path: &str) -> RemoteResult<RemoteStat> {
        trace!(path, "GETFILESTATUS");
        let response: FileStatusResponse =
            self.get_json(self.op_url(path, "GETFILESTATUS", &[]))?;
        Ok(response.file_status)
    }

    fn list(&self, path: &str) -> RemoteResult<Vec<(String, RemoteStat)>> {
        trace!(path, "LISTSTATUS");
        let response = self.execute(self.http.get(self.op_url(path, "LISTSTATUS", &[])))?;
        decode_listing(&response.bytes()?)
    }

    fn make_dirs(&self, path: &str, permission: Permission) -> RemoteResult<()> {
        trace!(path, %permission, "MKDIRS");
        let url = self.op_url(path, "MKDIRS", &[("permission", permission.to_string())]);
        if self.put_boolean(url)? {
            Ok(())
        } else {
            Err(RemoteError::Remote {
                exception: "MkdirsFailed".to_string(),
                message: format!("unable to create directory {path}"),
            })
        }
    }

    fn delete(&self, path: &str, recursive: bool) -> RemoteResult<()> {
        trace!(path, recursive, "DELETE");
        let url = self.op_url(path, "DELETE", &[("recursive", recursive.to_string())]);
        let response = self.execute(self.http.delete(url))?;
        let answer: BooleanResponse = decode_json(&response.bytes()?)?;
        if answer.boolean {
            Ok(())
        } else {
            Err(RemoteError::NotFound(path.to_string()))
        }
    }

    fn rename(&self, from: &str, to: &str) -> RemoteResult<()> {
        trace!(from, to, "RENAME");
        let url = self.op_url(from, "RENAME", &[("destination", to.to_string())]);
        if self.put_boolean(url)? {
            Ok(())
        } else {
            Err(RemoteError::Remote {
                exception: "RenameFailed".to_string(),
                message: format!("unable to rename {from} to {to}"),
            })
        }
    }

    fn set_permission(&self, path: &str, permission: Permission) -> RemoteResult<()> {
        trace!(path, %permission, "SETPERMISSION");
        let url = self.op_url(
            path,
            "SETPERMISSION",
            &[("permission", permission.to_string())],
        );
        self.execute(self.http.put(url))?;
        Ok(())
    }

    fn set_times(
        &self,
        path: &str,
        access_time_ms: Option<u64>,
        mod_time_ms: Option<u64>,
    ) -> RemoteResult<()> {
        trace!(path, ?access_time_ms, ?mod_time_ms, "SETTIMES");
        let url = self.op_url(
            path,
            "SETTIMES",
            &[
                ("accesstime", millis_param(access_time_ms)),
                ("modificationtime", millis_param(mod_time_ms)),
            ],
        );
        self.execute(self.http.put(url))?;
        Ok(())
    }

    fn write_whole(
        &self,
        path: &str,
        data: &[u8],
        permission: Permission,
        overwrite: bool,
    ) -> RemoteResult<()> {
        trace!(path, len = data.len(), %permission, overwrite, "CREATE");
        let url = self.op_url(
            path,
            "CREATE",
            &[
                ("overwrite", overwrite.to_string()),
                ("permission", permission.to_string()),
            ],
        );
        let response = self.execute(self.http.put(url))?;
        match Self::redirect_target(&response)? {
            Some(datanode) => {
                debug!(path, %datanode, "CREATE redirected to datanode");
                self.execute(
                    self.http
                        .put(datanode)
                        .header(CONTENT_TYPE, "application/octet-stream")
                        .body(data.to_vec()),
                )?;
                Ok(())
            }
            None if data.is_empty() => Ok(()),
            None => Err(RemoteError::Io(format!(
                "CREATE for {path} was not redirected to a datanode"
            ))),
        }
    }

    fn read_range(&self, path: &str, offset: u64, length: u64) -> RemoteResult<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        trace!(path, offset, length, "OPEN");
        let url = self.op_url(
            path,
            "OPEN",
            &[("offset", offset.to_string()), ("length", length.to_string())],
        );
        let response = self.execute(self.http.get(url))?;
        let bytes = match Self::redirect_target(&response)? {
            Some(datanode) => self.execute(self.http.get(datanode))?.bytes()?,
            None => response.bytes()?,
        };
        Ok(bytes)
    }
}
