use crate::error::Envelope;
use crate::models::StoredFile;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::signup,
        crate::routes::request_otp,
        crate::routes::verify_otp,
        crate::routes::login,
        crate::routes::logout,
        crate::routes::upload_file,
        crate::routes::list_files,
        crate::routes::download_file,
    ),
    components(schemas(
        StoredFile, Envelope,
        crate::auth::Role,
        crate::routes::SignupForm, crate::routes::SignupResponse,
        crate::routes::RequestOtpBody, crate::routes::OtpIssuedResponse,
        crate::routes::VerifyOtpBody,
        crate::routes::LoginForm, crate::routes::LoginResponse,
        crate::routes::UserInfo, crate::routes::UploadResponse,
        crate::routes::DownloadRef, crate::routes::FileListResponse,
    )),
    tags(
        (name = "user", description = "Accounts, OTP and sessions"),
        (name = "file", description = "Upload, listing and download"),
    )
)]
pub struct ApiDoc;
