// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use bytes::Bytes;

use remote_provider_traits::{RemoteOptions, RemoteStorageProvider};

use crate::Provider;

#[tokio::test]
async fn roundtrips_bytes_through_memory_backend() {
    let provider = Provider::memory(RemoteOptions::default()).unwrap();

    provider
        .upload_bytes_direct("/state/1", Bytes::from_static(b"hello"))
        .await
        .unwrap();

    let mut destination = Vec::new();
    let found = provider
        .download_file_direct("/state/1", &mut destination)
        .await
        .unwrap();
    assert!(found);
    assert_eq!(destination, b"hello");
}

#[tokio::test]
async fn download_of_missing_path_returns_false() {
    let provider = Provider::memory(RemoteOptions::default()).unwrap();

    let mut destination = Vec::new();
    let found = provider
        .download_file_direct("/state/missing", &mut destination)
        .await
        .unwrap();
    assert!(!found);
}

#[tokio::test]
async fn delete_of_missing_path_succeeds() {
    let provider = Provider::memory(RemoteOptions::default()).unwrap();
    provider.delete_file_direct("/state/never-existed").await.unwrap();
}

#[tokio::test]
async fn enumerate_files_lists_uploaded_paths() {
    let provider = Provider::memory(RemoteOptions::default()).unwrap();

    provider
        .upload_bytes_direct("/state/1", Bytes::from_static(b"a"))
        .await
        .unwrap();
    provider
        .upload_bytes_direct("/state/2", Bytes::from_static(b"b"))
        .await
        .unwrap();

    let mut paths = provider.enumerate_files("/state/", true).await.unwrap();
    paths.sort();
    assert_eq!(paths, vec!["/state/1".to_string(), "/state/2".to_string()]);
}

#[tokio::test]
async fn upload_overwrites_existing_path_idempotently() {
    let provider = Provider::memory(RemoteOptions::default()).unwrap();

    provider
        .upload_bytes_direct("/state/1", Bytes::from_static(b"first"))
        .await
        .unwrap();
    provider
        .upload_bytes_direct("/state/1", Bytes::from_static(b"second"))
        .await
        .unwrap();

    let mut destination = Vec::new();
    provider
        .download_file_direct("/state/1", &mut destination)
        .await
        .unwrap();
    assert_eq!(destination, b"second");
}
