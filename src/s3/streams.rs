use super::{S3Client, S3Location};
use crate::store::StoreError;
use aws_sdk_s3::operation::list_objects_v2::{ListObjectsV2Error, ListObjectsV2Output};
use aws_sdk_s3::types::Object;
use aws_smithy_async::future::pagination_stream::PaginationStream;
use aws_smithy_runtime_api::client::{orchestrator::HttpResponse, result::SdkError};
use futures_util::Stream;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

type InnerListError = SdkError<ListObjectsV2Error, HttpResponse>;

/// A stream of pages of the objects under a key prefix
#[derive(Debug)]
#[must_use = "streams do nothing unless polled"]
pub(super) struct ListObjects {
    namespace: S3Location,
    inner: Option<PaginationStream<Result<ListObjectsV2Output, InnerListError>>>,
}

impl ListObjects {
    pub(super) fn new(client: &S3Client, namespace: S3Location) -> Self {
        let inner = client
            .inner
            .list_objects_v2()
            .bucket(namespace.bucket())
            .prefix(namespace.key())
            .into_paginator()
            .send();
        ListObjects {
            namespace,
            inner: Some(inner),
        }
    }
}

impl Stream for ListObjects {
    type Item = Result<Vec<S3Location>, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return None.into();
        };
        let Some(r) = ready!(inner.poll_next(cx)) else {
            self.inner = None;
            return None.into();
        };
        let page = match r {
            Ok(page) => page,
            Err(source) => {
                self.inner = None;
                return Some(Err(StoreError::List {
                    url: self.namespace.clone(),
                    source: source.into(),
                }))
                .into();
            }
        };
        let objects = page
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|Object { key, .. }| Some(self.namespace.with_key(key?)))
            .collect::<Vec<_>>();
        Some(Ok(objects)).into()
    }
}
