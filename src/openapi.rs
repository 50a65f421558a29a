use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::upload::handler::upload_image,
    ),
    components(
        schemas(
            crate::error::ErrorEnvelope,
            crate::features::health::HealthResponse,
            crate::features::upload::UploadForm,
            crate::features::upload::UploadResponse,
        )
    ),
    tags(
        (name = "Upload", description = "图片上传；成功后通过 /images/<type>.jpg 访问"),
        (name = "Health", description = "Health APIs"),
    ),
    info(
        title = "Image Intake API",
        version = "0.1.0",
        description = "图片上传与规范化服务 (Axum)"
    )
)]
pub struct ApiDoc;
