mod location;
mod streams;
pub(crate) use self::location::*;
use self::streams::ListObjects;
use crate::store::{BoxError, ObjectStore, StoreError};
use aws_sdk_s3::{
    primitives::ByteStream,
    types::{Tag, Tagging},
    Client,
};
use futures_util::{stream, Stream, TryStreamExt};

/// An [`ObjectStore`] backed by AWS S3 or an S3-compatible service
#[derive(Clone, Debug)]
pub(crate) struct S3Client {
    inner: Client,
}

impl S3Client {
    /// Construct a client using the standard AWS configuration chain.
    ///
    /// `region` overrides the configured region.  If `endpoint_url` is set
    /// (e.g., for LocalStack), requests are sent there using path-style
    /// addressing.
    pub(crate) async fn new(region: Option<String>, endpoint_url: Option<String>) -> S3Client {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let path_style = endpoint_url.is_some();
        if let Some(url) = endpoint_url {
            tracing::debug!(%url, "Using custom S3 endpoint");
            loader = loader.endpoint_url(url);
        }
        let config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(path_style)
            .build();
        S3Client {
            inner: Client::from_conf(s3_config),
        }
    }

    async fn get_tag_set(&self, object: &S3Location) -> Result<Vec<Tag>, StoreError> {
        let output = self
            .inner
            .get_object_tagging()
            .bucket(object.bucket())
            .key(object.key())
            .send()
            .await
            .map_err(|e| StoreError::GetTag {
                url: object.clone(),
                source: e.into(),
            })?;
        Ok(output.tag_set)
    }
}

impl ObjectStore for S3Client {
    fn list_objects(
        &self,
        namespace: &S3Location,
    ) -> impl Stream<Item = Result<S3Location, StoreError>> + Send {
        ListObjects::new(self, namespace.clone())
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, StoreError>)))
            .try_flatten()
    }

    async fn get_tag(&self, object: &S3Location, name: &str) -> Result<Option<String>, StoreError> {
        let tags = self.get_tag_set(object).await?;
        Ok(tags
            .into_iter()
            .find(|t| t.key() == name)
            .map(|t| t.value().to_owned()))
    }

    #[tracing::instrument(skip_all, fields(url = %object, tag = name, value = value))]
    async fn put_tag(&self, object: &S3Location, name: &str, value: &str) -> Result<(), StoreError> {
        let put_error = |source: BoxError| StoreError::PutTag {
            url: object.clone(),
            tag: name.to_owned(),
            source,
        };
        // PutObjectTagging replaces the whole tag set, so carry over any
        // other tags already on the object
        let mut tags = self
            .get_tag_set(object)
            .await?
            .into_iter()
            .filter(|t| t.key() != name)
            .collect::<Vec<_>>();
        tags.push(
            Tag::builder()
                .key(name)
                .value(value)
                .build()
                .map_err(|e| put_error(e.into()))?,
        );
        let tagging = Tagging::builder()
            .set_tag_set(Some(tags))
            .build()
            .map_err(|e| put_error(e.into()))?;
        tracing::debug!("Setting object tag");
        self.inner
            .put_object_tagging()
            .bucket(object.bucket())
            .key(object.key())
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| put_error(e.into()))?;
        Ok(())
    }

    async fn read_object(&self, object: &S3Location) -> Result<Vec<u8>, StoreError> {
        let read_error = |source: BoxError| StoreError::Read {
            url: object.clone(),
            source,
        };
        tracing::debug!(url = %object, "Downloading object");
        let output = self
            .inner
            .get_object()
            .bucket(object.bucket())
            .key(object.key())
            .send()
            .await
            .map_err(|e| read_error(e.into()))?;
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| read_error(e.into()))?;
        Ok(body.to_vec())
    }

    async fn write_object(&self, object: &S3Location, content: Vec<u8>) -> Result<(), StoreError> {
        tracing::debug!(url = %object, size = content.len(), "Uploading object");
        self.inner
            .put_object()
            .bucket(object.bucket())
            .key(object.key())
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| StoreError::Write {
                url: object.clone(),
                source: e.into(),
            })?;
        Ok(())
    }
}
