use crate::warehouse::Redshift;
use clap::Args;

/// Connection settings for the Redshift cluster
#[derive(Args, Clone, Debug, Eq, PartialEq)]
pub(crate) struct WarehouseArgs {
    /// Hostname of the Redshift cluster endpoint
    #[arg(long, env = "REDSHIFT_HOST", default_value = "localhost", value_name = "HOST")]
    pub(crate) db_host: String,

    /// Port on which the cluster accepts connections
    #[arg(long, env = "REDSHIFT_PORT", default_value_t = 5439, value_name = "PORT")]
    pub(crate) db_port: u16,

    /// Database to load into
    #[arg(long, env = "REDSHIFT_DATABASE", default_value = "dev", value_name = "NAME")]
    pub(crate) db_name: String,

    /// Database user
    #[arg(long, env = "REDSHIFT_USER", default_value = "awsuser", value_name = "USER")]
    pub(crate) db_user: String,

    /// Password for the database user
    #[arg(long, env = "REDSHIFT_PASSWORD", hide_env_values = true, value_name = "PASSWORD")]
    pub(crate) db_password: Option<String>,
}

impl WarehouseArgs {
    pub(crate) fn warehouse(&self) -> Redshift {
        Redshift::new(
            &self.db_host,
            self.db_port,
            &self.db_name,
            &self.db_user,
            self.db_password.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        warehouse: WarehouseArgs,
    }

    #[test]
    fn explicit_values() {
        let h = Harness::try_parse_from([
            "tagload",
            "--db-host",
            "redshift-cluster-1.example.us-east-1.redshift.amazonaws.com",
            "--db-port",
            "5440",
            "--db-name",
            "reddit",
            "--db-user",
            "loader",
            "--db-password",
            "hunter2",
        ])
        .unwrap();
        assert_eq!(
            h.warehouse,
            WarehouseArgs {
                db_host: "redshift-cluster-1.example.us-east-1.redshift.amazonaws.com".into(),
                db_port: 5440,
                db_name: "reddit".into(),
                db_user: "loader".into(),
                db_password: Some("hunter2".into()),
            }
        );
        let debug = format!("{:?}", h.warehouse.warehouse());
        assert!(debug.contains("redshift-cluster-1.example.us-east-1.redshift.amazonaws.com:5440/reddit"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn bad_port() {
        let r = Harness::try_parse_from(["tagload", "--db-port", "redshift"]);
        assert!(r.is_err());
    }
}
