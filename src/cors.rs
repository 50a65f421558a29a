use axum::http::{HeaderName, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

use crate::config::CorsConfig;

/// 配置项解析结果："*" 优先于具体列表。
#[derive(Debug, PartialEq)]
enum AllowList<T> {
    Any,
    List(Vec<T>),
}

impl<T> AllowList<T> {
    fn is_any(&self) -> bool {
        matches!(self, AllowList::Any)
    }

    fn is_empty(&self) -> bool {
        matches!(self, AllowList::List(v) if v.is_empty())
    }
}

fn parse_list<T>(
    label: &str,
    values: &[String],
    parse: impl Fn(&str) -> Option<T>,
) -> AllowList<T> {
    let mut items = Vec::new();
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if value == "*" {
            return AllowList::Any;
        }
        match parse(value) {
            Some(item) => items.push(item),
            None => tracing::warn!(field = label, value, "CORS 配置含无效值，已忽略"),
        }
    }
    AllowList::List(items)
}

/// 根据配置构建 CORS 中间件；配置无效或未启用时返回 None。
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    if !cors.enabled {
        return None;
    }

    let origins = parse_list("allowed_origins", &cors.allowed_origins, |v| {
        HeaderValue::from_str(v).ok()
    });
    if origins.is_empty() {
        tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
        return None;
    }
    let methods = parse_list("allowed_methods", &cors.allowed_methods, |v| {
        Method::from_bytes(v.to_ascii_uppercase().as_bytes()).ok()
    });
    let headers = parse_list("allowed_headers", &cors.allowed_headers, |v| {
        HeaderName::from_bytes(v.to_ascii_lowercase().as_bytes()).ok()
    });

    if cors.allow_credentials && (origins.is_any() || methods.is_any() || headers.is_any()) {
        tracing::error!("CORS 配置无效：allow_credentials=true 不能与 \"*\" 同时使用，已跳过启用");
        return None;
    }

    let mut layer = CorsLayer::new()
        .allow_origin(match origins {
            AllowList::Any => AllowOrigin::from(Any),
            AllowList::List(v) => AllowOrigin::list(v),
        })
        .allow_methods(match methods {
            AllowList::Any => AllowMethods::from(Any),
            AllowList::List(v) => AllowMethods::list(v),
        })
        .allow_headers(match headers {
            AllowList::Any => AllowHeaders::from(Any),
            AllowList::List(v) => AllowHeaders::list(v),
        });

    if cors.allow_credentials {
        layer = layer.allow_credentials(true);
    }
    if let Some(secs) = cors.max_age_secs.filter(|s| *s > 0) {
        layer = layer.max_age(Duration::from_secs(secs));
    }

    Some(layer)
}

#[cfg(test)]
mod tests {
    use super::{AllowList, build_cors_layer, parse_list};
    use crate::config::CorsConfig;
    use axum::http::Method;

    #[test]
    fn default_config_is_permissive() {
        assert!(build_cors_layer(&CorsConfig::default()).is_some());
    }

    #[test]
    fn build_cors_layer_skips_when_origins_empty() {
        let cors = CorsConfig {
            allowed_origins: Vec::new(),
            ..CorsConfig::default()
        };
        assert!(build_cors_layer(&cors).is_none());
    }

    #[test]
    fn build_cors_layer_rejects_credentials_with_wildcard() {
        let cors = CorsConfig {
            allow_credentials: true,
            ..CorsConfig::default()
        };
        assert!(build_cors_layer(&cors).is_none());
    }

    #[test]
    fn method_list_normalizes_case_and_skips_garbage() {
        let input = vec!["get".to_string(), " POST ".to_string(), "".to_string()];
        let parsed = parse_list("allowed_methods", &input, |v| {
            Method::from_bytes(v.to_ascii_uppercase().as_bytes()).ok()
        });
        assert_eq!(parsed, AllowList::List(vec![Method::GET, Method::POST]));
    }
}
