//! CLI argument definitions for `tbv`.
//!
//! Global flags override values from the configuration file and the
//! environment; see [`Cli::apply_to`].

use crate::config::Settings;
use crate::package_spec::PackageSpec;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Verify that npm packages were built from the source they claim.
#[derive(Parser, Debug)]
#[command(name = "tbv")]
#[command(version, about)]
#[command(long_about = concat!(
    "Verify that npm packages were built from the source they claim.\n\n",
    "`verify` fetches a published version from the registry, checks out the ",
    "commit it names, packs that checkout, and compares the result file by ",
    "file with the published archive.\n\n",
    "`test` packs a local working tree and a fresh checkout of its current ",
    "commit from the declared repository, then compares the two digests.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Verify the latest version of a package:\n",
    "    $ tbv verify left-pad\n\n",
    "  Verify a specific version of a scoped package:\n",
    "    $ tbv verify @scope/pkg@2.1.0\n\n",
    "  Check that the current directory packs reproducibly:\n",
    "    $ tbv test\n\n",
    "  Emit the step table as JSON:\n",
    "    $ tbv --json verify left-pad@1.3.0",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Read settings from this file instead of the default locations.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Registry base URL [default: the public npm registry].
    #[arg(long, value_name = "URL", global = true)]
    pub registry: Option<String>,

    /// Whole-run deadline in seconds; 0 disables it.
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Stream run messages to stderr (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true
    )]
    pub verbosity: u8,

    /// Print the final step table as JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Verify a published package against its repository.
    Verify(VerifyArgs),

    /// Check that a local working tree packs like its remote commit.
    Test(TestArgs),
}

/// Arguments for the verify command.
#[derive(Parser, Debug, Clone)]
pub struct VerifyArgs {
    /// Package to verify, as `name` or `name@version`.
    #[arg(value_name = "PACKAGE")]
    pub package: PackageSpec,
}

/// Arguments for the test command.
#[derive(Parser, Debug, Clone)]
pub struct TestArgs {
    /// Package directory [default: current directory].
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<Utf8PathBuf>,
}

impl Cli {
    /// Applies command-line overrides on top of loaded settings.
    ///
    /// # Examples
    ///
    /// ```
    /// use clap::Parser;
    /// use tbv::cli::Cli;
    /// use tbv::config::Settings;
    ///
    /// let cli = Cli::parse_from(["tbv", "--timeout", "0", "verify", "left-pad"]);
    /// let mut settings = Settings::default();
    /// cli.apply_to(&mut settings);
    /// assert_eq!(settings.timeout_secs, 0);
    /// ```
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(registry) = &self.registry {
            settings.registry_url.clone_from(registry);
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = timeout;
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
