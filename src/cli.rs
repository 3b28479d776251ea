use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::{
    adapters::{mock::MockConnector, s3::S3Connector, Connector},
    config::{ConfigPatch, EnvSecretProvider},
    model::{error::StorageError, oss::SignMethod, outcome::Outcome},
    store::{CopyOptions, ListOptions, OssStore, SignOptions},
    util::{headers::UploadOptions, object},
};

#[derive(Debug, Parser)]
#[command(name = "ossctl", version, about = "Object storage operations from the command line")]
pub struct Cli {
    /// Bucket URI: oss://, s3://, gs:// or mock://
    #[arg(value_name = "BUCKET_URI")]
    pub bucket: String,

    #[arg(long, env = "OSS_REGION", default_value = "")]
    pub region: String,

    #[arg(long, env = "OSS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Talk plain http to the default endpoint
    #[arg(long)]
    pub insecure: bool,

    #[arg(long, default_value_t = crate::config::DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a local file
    Upload {
        path: String,
        file: PathBuf,
        #[arg(long)]
        content_type: Option<String>,
        #[arg(long)]
        acl: Option<String>,
        #[arg(long)]
        storage_class: Option<String>,
        /// Name offered to browsers when the object is downloaded
        #[arg(long)]
        file_name: Option<String>,
        /// Object tag as key=value, repeatable
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,
        #[arg(long)]
        forbid_overwrite: bool,
    },
    Download {
        path: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    Delete {
        path: String,
    },
    Exists {
        path: String,
    },
    List {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long)]
        marker: Option<String>,
        #[arg(long)]
        max_keys: Option<i32>,
        #[arg(long)]
        delimiter: Option<String>,
        /// Follow markers until the listing is complete
        #[arg(long)]
        all: bool,
    },
    Copy {
        source: String,
        target: String,
        #[arg(long)]
        source_bucket: Option<String>,
    },
    /// Print a time-limited URL
    Sign {
        path: String,
        #[arg(long, default_value_t = 3600)]
        expires: u64,
        #[arg(long)]
        put: bool,
        #[arg(long)]
        content_type: Option<String>,
    },
}

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
/// `exists` found nothing.
pub const EXIT_MISSING: u8 = 2;

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got: {}", raw))
}

fn report<T>(outcome: Outcome<T>, print: impl FnOnce(T)) -> u8 {
    match outcome {
        Outcome::Success(value) => {
            print(value);
            EXIT_SUCCESS
        }
        Outcome::Failure(failure) => {
            error!(error_message=%failure.error, path=?failure.path, error_group="operation");
            eprintln!("error: {}", failure.error);
            EXIT_FAILURE
        }
    }
}

pub async fn run(cli: Cli) -> u8 {
    let provider = match object::parse_provider_from_uri(&cli.bucket) {
        Err(err) => {
            eprintln!("error: {}", err);
            return EXIT_FAILURE;
        }
        Ok(provider) => provider,
    };
    let bucket = object::parse_bucket_from_uri(&cli.bucket).to_string();
    let region = if cli.region.is_empty() && provider.is_mock() {
        "local".to_string()
    } else {
        cli.region.clone()
    };
    info!(provider=?provider, bucket=%bucket, region=%region, "args");

    let connector: Box<dyn Connector> = if provider.is_mock() {
        Box::new(MockConnector::new(Default::default()))
    } else {
        Box::new(S3Connector)
    };
    let mut store = OssStore::new(connector, Box::new(EnvSecretProvider));

    let patch = ConfigPatch {
        provider: Some(provider),
        endpoint: cli.endpoint.clone(),
        secure: Some(!cli.insecure),
        timeout_ms: Some(cli.timeout_ms),
        ..Default::default()
    }
    .target(&region, &bucket);
    let patch = if provider.is_mock() {
        patch.credentials("mock", "mock")
    } else {
        patch
    };

    if !store.initialize(patch) {
        let message = store
            .last_error()
            .map(|err| err.to_string())
            .unwrap_or_else(|| StorageError::NotInitialized.to_string());
        eprintln!("error: {}", message);
        return EXIT_FAILURE;
    }

    let code = execute(&store, cli.command).await;
    store.teardown();
    code
}

async fn execute(store: &OssStore, command: Command) -> u8 {
    match command {
        Command::Upload {
            path,
            file,
            content_type,
            acl,
            storage_class,
            file_name,
            tags,
            forbid_overwrite,
        } => {
            let payload = match tokio::fs::read(&file).await {
                Err(err) => {
                    eprintln!("error: failed to read {}: {}", file.display(), err);
                    return EXIT_FAILURE;
                }
                Ok(payload) => payload,
            };
            let options = UploadOptions {
                storage_class,
                acl,
                content_type,
                download_file_name: file_name,
                tags,
                forbid_overwrite,
                on_progress: Some(Arc::new(|percent: f64| info!(percent, "upload progress"))),
            };
            report(store.upload(&path, payload, options).await, |receipt| {
                println!("{}", receipt.url);
            })
        }
        Command::Download { path, output } => {
            report(store.download(&path, output.as_deref()).await, |download| {
                if let Some(destination) = download.destination {
                    println!("{}", destination.display());
                } else {
                    println!("{}", String::from_utf8_lossy(&download.content));
                }
            })
        }
        Command::Delete { path } => report(store.delete_object(&path).await, |deleted| {
            println!("deleted {}", deleted.path);
        }),
        Command::Exists { path } => {
            let exists = store.exists(&path).await;
            println!("{}", exists);
            match store.last_error() {
                Some(err) => {
                    eprintln!("error: {}", err);
                    EXIT_FAILURE
                }
                None if exists => EXIT_SUCCESS,
                None => EXIT_MISSING,
            }
        }
        Command::List {
            prefix,
            marker,
            max_keys,
            delimiter,
            all,
        } => {
            let mut options = ListOptions {
                prefix,
                marker,
                max_keys,
                delimiter,
            };
            loop {
                let mut next = None;
                let code = report(store.list_objects(options.clone()).await, |listing| {
                    for prefix in &listing.prefixes {
                        println!("PRE {}", prefix);
                    }
                    for file in &listing.files {
                        println!("{:>12} {}", file.size, file.key);
                    }
                    if listing.is_truncated {
                        next = listing.next_marker;
                    }
                });
                if code != EXIT_SUCCESS {
                    return code;
                }
                match next {
                    Some(marker) if all => options.marker = Some(marker),
                    Some(marker) => {
                        eprintln!("more results, continue with --marker {}", marker);
                        return EXIT_SUCCESS;
                    }
                    None => return EXIT_SUCCESS,
                }
            }
        }
        Command::Copy {
            source,
            target,
            source_bucket,
        } => {
            let options = CopyOptions {
                source_bucket,
                headers: Vec::new(),
            };
            report(store.copy_object(&source, &target, options).await, |copied| {
                println!("copied {} -> {}", copied.source, copied.target);
            })
        }
        Command::Sign {
            path,
            expires,
            put,
            content_type,
        } => {
            let options = SignOptions {
                method: if put { SignMethod::Put } else { SignMethod::Get },
                content_type,
            };
            report(
                store.get_signed_url(&path, Duration::from_secs(expires), options),
                |signed| println!("{}", signed.url),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_tag() {
        let cases = vec![
            ("team=web", Some(("team", "web"))),
            ("empty=", Some(("empty", ""))),
            ("=value", None),
            ("novalue", None),
        ];

        for (input, expected) in cases {
            let result = parse_tag(input).ok();
            let expected = expected.map(|(k, v)| (k.to_string(), v.to_string()));
            assert_eq!(result, expected, "failed for case: {}", input);
        }
    }

    #[test]
    fn test_parse_args() {
        let cli = Cli::try_parse_from([
            "ossctl",
            "oss://b1",
            "--region",
            "cn-hangzhou",
            "upload",
            "a/b.txt",
            "./b.txt",
            "--tag",
            "team=web",
            "--forbid-overwrite",
        ])
        .expect("valid arguments");

        assert_eq!(cli.bucket, "oss://b1");
        assert_eq!(cli.region, "cn-hangzhou");
        match cli.command {
            Command::Upload {
                path,
                tags,
                forbid_overwrite,
                ..
            } => {
                assert_eq!(path, "a/b.txt");
                assert_eq!(tags, vec![("team".to_string(), "web".to_string())]);
                assert!(forbid_overwrite);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_against_mock_bucket() {
        let cli = Cli::try_parse_from(["ossctl", "mock://b1", "list", "--all"])
            .expect("valid arguments");
        assert_eq!(run(cli).await, EXIT_SUCCESS);

        let cli = Cli::try_parse_from(["ossctl", "ftp://b1", "exists", "a"])
            .expect("valid arguments");
        assert_eq!(run(cli).await, EXIT_FAILURE);
    }
}
