use crate::auth::AuthorizationRecord;
use crate::config::API_VERSION_PATH;
use crate::transport::{HttpRequest, Method};

use bytes::Bytes;
use std::fmt::{self, Display, Formatter};

/// The API operations this crate calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Exchange the key pair for an account token.
    AuthorizeAccount,
    /// Begin a large file.
    StartLargeFile,
    /// Obtain a capability to upload parts of a large file.
    GetUploadPartUrl,
    /// Upload one part of a large file.
    UploadPart,
    /// Assemble the uploaded parts into the final object.
    FinishLargeFile,
    /// Abort a large file and discard its parts.
    CancelLargeFile,
    /// List the parts uploaded so far.
    ListParts,
    /// Obtain a capability to upload a whole object to a bucket.
    GetUploadUrl,
    /// Upload a whole object in one request.
    UploadFile,
    /// Download an object by its file id.
    DownloadFileById,
    /// Download an object by bucket and file name.
    DownloadFileByName,
}

impl Endpoint {
    /// The operation name as it appears in API paths.
    pub fn name(self) -> &'static str {
        match self {
            Self::AuthorizeAccount => "b2_authorize_account",
            Self::StartLargeFile => "b2_start_large_file",
            Self::GetUploadPartUrl => "b2_get_upload_part_url",
            Self::UploadPart => "b2_upload_part",
            Self::FinishLargeFile => "b2_finish_large_file",
            Self::CancelLargeFile => "b2_cancel_large_file",
            Self::ListParts => "b2_list_parts",
            Self::GetUploadUrl => "b2_get_upload_url",
            Self::UploadFile => "b2_upload_file",
            Self::DownloadFileById => "b2_download_file_by_id",
            Self::DownloadFileByName => "b2_download_file_by_name",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a request is authorized.
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum Credential {
    /// The current account token, refreshed as needed.
    Account,
    /// A token that came with an upload capability.
    Capability(String),
    /// The `Basic` header of the authorization exchange.
    Basic(String),
}

/// Where a request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    /// `{apiUrl}/b2api/v2/{endpoint}`.
    Api,
    /// `{downloadUrl}{path}`.
    Download(String),
    /// An absolute URL, as handed out with a capability.
    Url(String),
}

/// One logical API call, before authorization is attached.
///
/// The same `ApiRequest` is resolved again for each attempt, so a replay after
/// a token refresh carries the new token.
#[derive(Clone)]
pub struct ApiRequest {
    pub(crate) endpoint: Endpoint,
    pub(crate) method: Method,
    pub(crate) target: Target,
    pub(crate) credential: Credential,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Bytes,
}

impl ApiRequest {
    fn new(endpoint: Endpoint, method: Method, target: Target, credential: Credential) -> Self {
        Self {
            endpoint,
            method,
            target,
            credential,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// A `POST` of a JSON body to an account-authorized API endpoint.
    pub fn api(endpoint: Endpoint, body: &serde_json::Value) -> Self {
        Self::new(endpoint, Method::Post, Target::Api, Credential::Account)
            .header("Content-Type", "application/json")
            .body(Bytes::from(body.to_string()))
    }

    /// A `GET` against the download URL of the account.
    ///
    /// `path` is appended to the download URL and must start with `/`.
    pub fn download<P: Into<String>>(endpoint: Endpoint, path: P) -> Self {
        Self::new(
            endpoint,
            Method::Get,
            Target::Download(path.into()),
            Credential::Account,
        )
    }

    /// A `POST` to a capability URL, authorized by the capability's token.
    pub fn capability<U, T>(endpoint: Endpoint, url: U, token: T) -> Self
    where
        U: Into<String>,
        T: Into<String>,
    {
        Self::new(
            endpoint,
            Method::Post,
            Target::Url(url.into()),
            Credential::Capability(token.into()),
        )
    }

    pub(crate) fn authorize_account(auth_url: &str, basic: String) -> Self {
        let url = format!(
            "{}{}{}",
            auth_url.trim_end_matches('/'),
            API_VERSION_PATH,
            Endpoint::AuthorizeAccount.name()
        );
        Self::new(
            Endpoint::AuthorizeAccount,
            Method::Get,
            Target::Url(url),
            Credential::Basic(basic),
        )
    }

    /// Add a header.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(self, body: Bytes) -> Self {
        Self { body, ..self }
    }

    /// The endpoint this request calls.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Whether this request needs the account token.
    pub(crate) fn needs_account_token(&self) -> bool {
        self.credential == Credential::Account
    }

    /// Attach authorization and produce the request to send.
    ///
    /// `record` is required for account-authorized requests.
    pub(crate) fn resolve(&self, record: Option<&AuthorizationRecord>) -> Option<HttpRequest> {
        let (url, authorization) = match (&self.target, &self.credential, record) {
            (Target::Api, Credential::Account, Some(record)) => (
                format!(
                    "{}{}{}",
                    record.api_url.trim_end_matches('/'),
                    API_VERSION_PATH,
                    self.endpoint.name()
                ),
                record.authorization_token.clone(),
            ),
            (Target::Download(path), Credential::Account, Some(record)) => (
                format!("{}{}", record.download_url.trim_end_matches('/'), path),
                record.authorization_token.clone(),
            ),
            (Target::Url(url), Credential::Capability(token), _) => (url.clone(), token.clone()),
            (Target::Url(url), Credential::Basic(basic), _) => {
                (url.clone(), format!("Basic {basic}"))
            }
            _ => return None,
        };

        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        headers.push(("Authorization".to_string(), authorization));
        headers.extend(self.headers.iter().cloned());

        Some(HttpRequest {
            method: self.method,
            url,
            headers,
            body: self.body.clone(),
        })
    }
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("target", &self.target)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}
