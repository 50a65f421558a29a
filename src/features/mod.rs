/// 健康检查
pub mod health;
/// 图片上传 / 规范化 / 存储
pub mod upload;
