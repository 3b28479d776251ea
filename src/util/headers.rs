use std::{fmt, sync::Arc};

use crate::{
    model::oss::{FractionFn, PercentFn, PutRequest},
    util::object::{encode_uri_component, Provider},
};

#[derive(Clone, Default)]
pub struct UploadOptions {
    pub storage_class: Option<String>,
    pub acl: Option<String>,
    pub content_type: Option<String>,
    /// File name offered to browsers through `Content-Disposition`.
    pub download_file_name: Option<String>,
    pub tags: Vec<(String, String)>,
    pub forbid_overwrite: bool,
    pub on_progress: Option<PercentFn>,
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("storage_class", &self.storage_class)
            .field("acl", &self.acl)
            .field("content_type", &self.content_type)
            .field("download_file_name", &self.download_file_name)
            .field("tags", &self.tags)
            .field("forbid_overwrite", &self.forbid_overwrite)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

pub fn serialize_tags(tags: &[(String, String)]) -> String {
    tags.iter()
        .map(|(k, v)| format!("{}={}", encode_uri_component(k), encode_uri_component(v)))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn content_disposition(file_name: &str) -> String {
    format!("attachment; filename=\"{}\"", encode_uri_component(file_name))
}

pub fn build_put_request(provider: Provider, options: &UploadOptions) -> PutRequest {
    let mut headers = vec![
        (
            provider.storage_class_header(),
            options
                .storage_class
                .clone()
                .unwrap_or_else(|| provider.default_storage_class().to_string()),
        ),
        (
            provider.acl_header(),
            options.acl.clone().unwrap_or_else(|| "private".to_string()),
        ),
    ];

    if let Some(content_type) = &options.content_type {
        headers.push(("Content-Type".to_string(), content_type.clone()));
    }

    if let Some(file_name) = &options.download_file_name {
        headers.push((
            "Content-Disposition".to_string(),
            content_disposition(file_name),
        ));
    }

    if !options.tags.is_empty() {
        headers.push((provider.tagging_header(), serialize_tags(&options.tags)));
    }

    if options.forbid_overwrite {
        let (name, value) = provider.forbid_overwrite_header();
        headers.push((name.to_string(), value.to_string()));
    }

    let progress = options.on_progress.clone().map(|on_progress| {
        let adapted: FractionFn = Arc::new(move |fraction: f64| on_progress(fraction * 100.0));
        adapted
    });

    PutRequest { headers, progress }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_default_headers() {
        let cases = vec![
            (
                Provider::OSS,
                vec![
                    ("x-oss-storage-class", "Standard"),
                    ("x-oss-object-acl", "private"),
                ],
            ),
            (
                Provider::AWS,
                vec![("x-amz-storage-class", "STANDARD"), ("x-amz-acl", "private")],
            ),
        ];

        for (provider, expected) in cases {
            let req = build_put_request(provider, &UploadOptions::default());
            let expected: Vec<(String, String)> = expected
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            assert_eq!(req.headers, expected, "failed for case: {:?}", provider);
            assert!(req.progress.is_none());
        }
    }

    #[test]
    fn test_optional_headers() {
        let options = UploadOptions {
            storage_class: Some("IA".to_string()),
            acl: Some("public-read".to_string()),
            content_type: Some("text/plain".to_string()),
            download_file_name: Some("my report.txt".to_string()),
            tags: vec![
                ("team".to_string(), "web".to_string()),
                ("env".to_string(), "prod".to_string()),
            ],
            forbid_overwrite: true,
            on_progress: None,
        };

        let req = build_put_request(Provider::OSS, &options);

        let cases = vec![
            ("x-oss-storage-class", "IA"),
            ("x-oss-object-acl", "public-read"),
            ("content-type", "text/plain"),
            ("Content-Disposition", "attachment; filename=\"my%20report.txt\""),
            ("x-oss-tagging", "team=web&env=prod"),
            ("x-oss-forbid-overwrite", "true"),
        ];

        for (name, expected) in cases {
            assert_eq!(req.header(name), Some(expected), "failed for case: {}", name);
        }
    }

    #[test]
    fn test_forbid_overwrite_dialects() {
        let options = UploadOptions {
            forbid_overwrite: true,
            ..Default::default()
        };

        assert_eq!(
            build_put_request(Provider::AWS, &options).header("If-None-Match"),
            Some("*")
        );
        assert_eq!(
            build_put_request(Provider::GCS, &options).header("x-goog-if-generation-match"),
            Some("0")
        );
    }

    #[test]
    fn test_progress_is_percentage() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let options = UploadOptions {
            on_progress: Some(Arc::new(move |percent: f64| {
                sink.lock().unwrap().push(percent)
            })),
            ..Default::default()
        };

        let req = build_put_request(Provider::OSS, &options);
        let progress = req.progress.expect("progress callback should be adapted");
        progress(0.0);
        progress(0.5);
        progress(1.0);

        assert_eq!(*seen.lock().unwrap(), vec![0.0, 50.0, 100.0]);
    }
}
