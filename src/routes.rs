use std::sync::Arc;

use actix_web::cookie::Cookie;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_multipart::Multipart;
use futures_util::TryStreamExt as _;
use serde::Deserialize;

use crate::auth::{Principal, Role, SessionStore, SESSION_COOKIE};
use crate::credential;
use crate::error::{ApiError, Envelope};
use crate::models::*;
use crate::otp::{OtpOutcome, OtpStore};
use crate::repo::{Repo, RepoError};
use crate::storage::{extension_of, generate_storage_key, ExtensionPolicy, FileStore, FileStoreError};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(index)))
        .service(web::resource("/user/signup").route(web::post().to(signup)))
        .service(web::resource("/user/request-otp").route(web::post().to(request_otp)))
        .service(web::resource("/user/verify-otp").route(web::post().to(verify_otp)))
        .service(
            web::resource("/user/login")
                .route(web::get().to(login))
                .route(web::post().to(login)),
        )
        .service(
            web::resource("/user/logout")
                .route(web::get().to(logout))
                .route(web::post().to(logout)),
        )
        .service(web::resource("/file/upload").route(web::post().to(upload_file)))
        .service(web::resource("/file/list").route(web::get().to(list_files)))
        .service(web::resource("/file/download").route(web::get().to(download_file)));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub file_store: Arc<dyn FileStore>,
    pub sessions: Arc<SessionStore>,
    pub otp: Arc<OtpStore>,
    pub extensions: Arc<ExtensionPolicy>,
}

pub async fn index() -> HttpResponse {
    HttpResponse::Ok().json(Envelope::ok("Service is up"))
}

// ---------------- account + session handlers ----------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SignupForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub user_type: Option<String>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct SignupResponse {
    pub status: bool,
    pub message: String,
    pub user_id: Id,
}

#[utoipa::path(
    post,
    path = "/user/signup",
    responses(
        (status = 201, description = "User created", body = SignupResponse),
        (status = 400, description = "Missing fields or invalid user type"),
        (status = 409, description = "Username or email already taken")
    )
)]
pub async fn signup(
    data: web::Data<AppState>,
    form: web::Form<SignupForm>,
) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();
    let (username, email, password, user_type) =
        match (form.username, form.email, form.password, form.user_type) {
            (Some(u), Some(e), Some(p), Some(t))
                if !u.is_empty() && !e.is_empty() && !p.is_empty() && !t.is_empty() =>
            {
                (u, e, p, t)
            }
            _ => return Err(ApiError::missing_fields()),
        };
    let role = Role::parse(&user_type)
        .ok_or_else(|| ApiError::BadRequest("Invalid user type".into()))?;
    let password_hash = credential::hash_password(&password).map_err(|e| {
        log::error!("password hashing failed: {e}");
        ApiError::Internal
    })?;
    let user = data
        .repo
        .create_user(NewUser { username, email, password_hash, role })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => {
                ApiError::Conflict("User with this username or email already exists".into())
            }
            other => other.into(),
        })?;
    Ok(HttpResponse::Created().json(SignupResponse {
        status: true,
        message: "User created successfully".into(),
        user_id: user.id,
    }))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RequestOtpBody {
    pub email: Option<String>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct OtpIssuedResponse {
    pub status: bool,
    pub message: String,
    #[serde(rename = "OTP")]
    pub otp: String,
}

#[utoipa::path(
    post,
    path = "/user/request-otp",
    responses(
        (status = 200, description = "Code issued", body = OtpIssuedResponse),
        (status = 400, description = "Missing email")
    )
)]
pub async fn request_otp(
    data: web::Data<AppState>,
    body: web::Json<RequestOtpBody>,
) -> Result<HttpResponse, ApiError> {
    let email = body
        .into_inner()
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(ApiError::missing_fields)?;
    // no delivery transport is wired, so the code is echoed in the response
    let code = data.otp.issue(&email).await;
    Ok(HttpResponse::Ok().json(OtpIssuedResponse {
        status: true,
        message: "OTP generated successfully".into(),
        otp: code,
    }))
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct VerifyOtpBody {
    pub email: Option<String>,
    pub otp: Option<String>,
}

#[utoipa::path(
    post,
    path = "/user/verify-otp",
    responses(
        (status = 200, description = "Code matched"),
        (status = 400, description = "Missing fields or wrong code"),
        (status = 404, description = "No challenge on record")
    )
)]
pub async fn verify_otp(
    data: web::Data<AppState>,
    body: web::Json<VerifyOtpBody>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let (email, otp) = match (body.email, body.otp) {
        (Some(e), Some(o)) if !e.is_empty() && !o.is_empty() => (e, o),
        _ => return Err(ApiError::missing_fields()),
    };
    match data.otp.verify(&email, &otp) {
        OtpOutcome::NotFound => Err(ApiError::NotFound("OTP not found".into())),
        OtpOutcome::Mismatch => Err(ApiError::BadRequest("Invalid OTP".into())),
        OtpOutcome::Match => {
            Ok(HttpResponse::Ok().json(Envelope::ok("Email verified successfully")))
        }
    }
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct UserInfo {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    pub status: bool,
    pub message: String,
    pub user: UserInfo,
}

#[utoipa::path(
    post,
    path = "/user/login",
    responses(
        (status = 200, description = "Logged in; session cookie set", body = LoginResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    data: web::Data<AppState>,
    form: Option<web::Form<LoginForm>>,
    query: web::Query<LoginForm>,
) -> Result<HttpResponse, ApiError> {
    // accept form fields (POST) or query params (GET)
    let form = form.map(web::Form::into_inner).unwrap_or_default();
    let query = query.into_inner();
    let username = form.username.or(query.username).filter(|s| !s.is_empty());
    let password = form.password.or(query.password).filter(|s| !s.is_empty());
    let (username, password) = match (username, password) {
        (Some(u), Some(p)) => (u, p),
        _ => return Err(ApiError::missing_fields()),
    };

    // unknown user and wrong password get the same rejection; the response
    // must not say which check failed
    let user = data
        .repo
        .find_user_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".into()))?;
    let verified = credential::verify_password(&password, &user.password_hash).map_err(|e| {
        log::error!("credential verification failed for user {}: {e}", user.id);
        ApiError::Internal
    })?;
    if !verified {
        return Err(ApiError::Unauthorized("Invalid credentials".into()));
    }

    let token = data
        .sessions
        .create(Principal { user_id: user.id, role: user.role });
    let cookie = Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .finish();
    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        status: true,
        message: "User logged in successfully".into(),
        user: UserInfo {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/user/logout",
    responses((status = 200, description = "Session destroyed (idempotent)"))
)]
pub async fn logout(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    if let Some(cookie) = req.cookie(SESSION_COOKIE) {
        data.sessions.destroy(cookie.value());
    }
    let mut resp = HttpResponse::Ok().json(Envelope::ok("User logged out successfully"));
    let _ = resp.add_removal_cookie(&Cookie::build(SESSION_COOKIE, "").path("/").finish());
    Ok(resp)
}

// ---------------- file handlers -----------------------------------

pub const FILE_SIZE_LIMIT: usize = 25 * 1024 * 1024; // 25 MiB

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct UploadResponse {
    pub status: bool,
    pub message: String,
    pub file_id: Id,
}

#[utoipa::path(
    post,
    path = "/file/upload",
    responses(
        (status = 201, description = "File stored", body = UploadResponse),
        (status = 400, description = "Missing file or disallowed extension"),
        (status = 401, description = "Not an OPS session"),
        (status = 413, description = "Payload too large")
    )
)]
pub async fn upload_file(
    data: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        let (name, filename) = {
            let cd = field.content_disposition();
            (
                cd.get_name().map(str::to_string),
                cd.get_filename().map(str::to_string),
            )
        };
        if name.as_deref() != Some("file") {
            continue;
        }
        let display_name = match filename {
            Some(f) if !f.is_empty() => f,
            _ => return Err(ApiError::missing_fields()),
        };
        // extension gate is filename-based only; content is never inspected
        let extension = match extension_of(&display_name) {
            Some(ext) if data.extensions.permits(&ext) => ext,
            _ => return Err(ApiError::BadRequest("Invalid file type".into())),
        };

        let mut bytes: Vec<u8> = Vec::new();
        let mut field_stream = field;
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > FILE_SIZE_LIMIT {
                return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE)
                    .json(Envelope::fail("File too large")));
            }
            bytes.extend_from_slice(&chunk);
        }

        let storage_key = generate_storage_key();
        data.file_store
            .save(&storage_key, &extension, &bytes)
            .await
            .map_err(|e| {
                log::error!("file_store save error: {e}");
                ApiError::Internal
            })?;
        let record = match data
            .repo
            .create_file(NewStoredFile {
                display_name,
                storage_key: storage_key.clone(),
                extension: extension.clone(),
            })
            .await
        {
            Ok(r) => r,
            Err(e) => {
                // the blob must not outlive a failed record insert
                let _ = data.file_store.remove(&storage_key, &extension).await;
                return Err(e.into());
            }
        };
        return Ok(HttpResponse::Created().json(UploadResponse {
            status: true,
            message: "File uploaded successfully".into(),
            file_id: record.id,
        }));
    }
    Err(ApiError::missing_fields())
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct DownloadRef {
    pub download_link: String,
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct FileListResponse {
    pub status: bool,
    pub files: Vec<DownloadRef>,
}

#[utoipa::path(
    get,
    path = "/file/list",
    responses(
        (status = 200, description = "Download references for every stored file", body = FileListResponse),
        (status = 401, description = "Not a CLIENT session")
    )
)]
pub async fn list_files(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let files = data.repo.list_files().await?;
    // only the opaque reference leaves the server; display names stay internal
    let refs = files
        .iter()
        .map(|f| DownloadRef {
            download_link: format!("/file/download?file_hash={}", f.storage_key),
        })
        .collect();
    Ok(HttpResponse::Ok().json(FileListResponse { status: true, files: refs }))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub file_hash: Option<String>,
}

#[utoipa::path(
    get,
    path = "/file/download",
    params(("file_hash" = String, Query, description = "Storage key from /file/list")),
    responses(
        (status = 200, description = "File bytes"),
        (status = 401, description = "Not a CLIENT session"),
        (status = 404, description = "Unknown storage key")
    )
)]
pub async fn download_file(
    data: web::Data<AppState>,
    query: web::Query<DownloadQuery>,
) -> Result<HttpResponse, ApiError> {
    let key = query
        .into_inner()
        .file_hash
        .filter(|k| !k.is_empty())
        .ok_or_else(ApiError::missing_fields)?;
    let record = data
        .repo
        .find_file_by_key(&key)
        .await?
        .ok_or_else(|| ApiError::NotFound("File not found".into()))?;
    let bytes = match data
        .file_store
        .load(&record.storage_key, &record.extension)
        .await
    {
        Ok(b) => b,
        Err(FileStoreError::NotFound) => {
            // record without blob is a consistency fault, not a missing file
            log::error!(
                "blob missing for recorded file id={} key={}",
                record.id,
                record.storage_key
            );
            return Err(ApiError::Internal);
        }
        Err(e) => {
            log::error!("file_store load error: {e}");
            return Err(ApiError::Internal);
        }
    };
    let mime = infer::get(&bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    Ok(HttpResponse::Ok()
        .insert_header(("Content-Type", mime))
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", record.display_name),
        ))
        .body(bytes))
}
