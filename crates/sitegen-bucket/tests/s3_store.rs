use bytes::Bytes;
use sitegen_bucket::{BucketError, BucketStore, S3BucketStore, S3Config};
use uuid::Uuid;

const REQUIRED_VARS: &[&str] = &[
    "SITEGEN_TEST_S3_BUCKET",
    "SITEGEN_TEST_S3_ENDPOINT",
    "SITEGEN_TEST_S3_ACCESS_KEY_ID",
    "SITEGEN_TEST_S3_SECRET_ACCESS_KEY",
];

#[tokio::test]
async fn s3_store_put_list_and_refuse_overwrite() -> Result<(), BucketError> {
    let Some(config) = s3_config_from_env() else {
        eprintln!(
            "Skipping S3 bucket test; set {} to enable",
            REQUIRED_VARS.join(", ")
        );
        return Ok(());
    };

    let store = S3BucketStore::new(config).await?;
    let prefix = format!("integration-{}/", Uuid::new_v4());
    let key = format!("{prefix}index.html");

    store
        .put_object(&key, Bytes::from_static(b"<!DOCTYPE html>"), "text/html")
        .await?;

    let second = store
        .put_object(&key, Bytes::from_static(b"replacement"), "text/html")
        .await;
    assert!(matches!(second, Err(BucketError::AlreadyExists(_))));

    let listed = store.list_prefix(&prefix).await?;
    assert_eq!(listed, vec![key.clone()]);

    let fetched = store.get_object(&key).await?;
    assert_eq!(fetched.as_ref(), b"<!DOCTYPE html>");

    store.delete_object(&key).await?;
    assert!(matches!(
        store.get_object(&key).await,
        Err(BucketError::NotFound(_))
    ));

    Ok(())
}

fn s3_config_from_env() -> Option<S3Config> {
    let value = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());

    for &var in REQUIRED_VARS {
        value(var)?;
    }

    Some(S3Config {
        bucket: value("SITEGEN_TEST_S3_BUCKET")?,
        region: value("SITEGEN_TEST_S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
        endpoint: value("SITEGEN_TEST_S3_ENDPOINT"),
        access_key_id: value("SITEGEN_TEST_S3_ACCESS_KEY_ID"),
        secret_access_key: value("SITEGEN_TEST_S3_SECRET_ACCESS_KEY"),
        force_path_style: value("SITEGEN_TEST_S3_FORCE_PATH_STYLE")
            .map(|flag| flag == "true" || flag == "1")
            .unwrap_or(true),
        public_base_url: None,
    })
}
