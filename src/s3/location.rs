use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The location of an object on S3
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct S3Location {
    /// The bucket name
    bucket: String,

    /// The key.  For a namespace, this is the key prefix, which may be
    /// empty.
    key: String,
}

impl S3Location {
    /// Returns the bucket name
    pub(crate) fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Returns the key
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Returns true if the key looks like a "directory" placeholder, i.e.,
    /// ends in a forward slash
    pub(crate) fn is_dir_marker(&self) -> bool {
        self.key.ends_with('/')
    }

    /// Return a new `S3Location` in which `suffix` is appended to the key,
    /// with a `'/'` inserted in between if one isn't already present (unless
    /// the key is empty).
    pub(crate) fn join(&self, suffix: &str) -> S3Location {
        let mut joined = self.clone();
        if !joined.key.is_empty() && !joined.key.ends_with('/') {
            joined.key.push('/');
        }
        joined.key.push_str(suffix);
        joined
    }

    /// Return a new `S3Location` with the same bucket and using the given key
    pub(crate) fn with_key<S: Into<String>>(&self, key: S) -> S3Location {
        S3Location {
            bucket: self.bucket.clone(),
            key: key.into(),
        }
    }
}

impl fmt::Display for S3Location {
    /// Format an `S3Location` as an S3 URL
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for S3Location {
    type Err = S3LocationError;

    /// Parse an `S3Location` from an S3 URL
    fn from_str(s: &str) -> Result<S3Location, S3LocationError> {
        // <https://docs.aws.amazon.com/AmazonS3/latest/userguide/bucketnamingrules.html>
        fn is_bucket_char(c: char) -> bool {
            c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-'
        }

        let Some(s) = s.strip_prefix("s3://") else {
            return Err(S3LocationError::BadScheme);
        };
        let Some((bucket, key)) = s.split_once('/') else {
            return Err(S3LocationError::NoKey);
        };
        if bucket.is_empty() || !bucket.chars().all(is_bucket_char) {
            return Err(S3LocationError::BadBucket);
        }
        Ok(S3Location {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        })
    }
}

/// Error returned when parsing an invalid S3 URL
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub(crate) enum S3LocationError {
    /// The URL does not start with `"s3://"`
    #[error(r#"URL does not start with "s3://""#)]
    BadScheme,

    /// The URL does not contain a key
    #[error("URL does not contain an S3 object key")]
    NoKey,

    /// The bucket name is invalid
    #[error("invalid S3 bucket name")]
    BadBucket,
}
