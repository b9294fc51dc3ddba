use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bpaf::Bpaf;
use headdb_catalog::{
    CatalogCache,
    CatalogConfig,
    CatalogStore,
    Category,
    CategoryRefreshFailure,
    Entry,
    Fetch,
    RefreshListener,
    RefreshReport,
};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::utils::message;

const HEADDB_DESCRIPTION: &str = "Refresh the head catalog and look up heads";

fn vec_len<T>(vec: Vec<T>) -> usize {
    vec.len()
}

#[derive(Bpaf, Clone, Copy, Debug)]
pub enum Verbosity {
    Verbose(
        /// Increase logging verbosity
        ///
        /// Invoke multiple times for increasing detail.
        #[bpaf(short('v'), long("verbose"), req_flag(()), many, map(vec_len))]
        usize,
    ),

    /// Silence logs except for errors
    #[bpaf(short, long)]
    Quiet,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Verbose(0)
    }
}

#[derive(Bpaf, Debug)]
#[bpaf(options, descr(HEADDB_DESCRIPTION), version)]
pub struct HeadDbArgs {
    #[bpaf(external, fallback(Default::default()))]
    pub verbosity: Verbosity,

    /// Read configuration from this file
    /// instead of $XDG_CONFIG_HOME/headdb/headdb.toml
    #[bpaf(long, short, argument("PATH"))]
    pub config: Option<PathBuf>,

    /// Only consider heads of this category (with --name and --all)
    #[bpaf(long, argument("CATEGORY"))]
    pub category: Option<String>,

    #[bpaf(external(lookup), optional)]
    pub lookup: Option<Lookup>,
}

/// What to look up once the catalog is refreshed.
///
/// Without a lookup, the number of heads per category is printed.
#[derive(Bpaf, Clone, Debug, PartialEq)]
pub enum Lookup {
    /// Print the head with this id
    Id(#[bpaf(long("id"), argument("ID"))] u64),
    /// Print the head with this unique id
    Uuid(#[bpaf(long("uuid"), argument("UUID"))] Uuid),
    /// Print the head with this texture value
    Value(#[bpaf(long("value"), argument("VALUE"))] String),
    /// Print heads with a tag containing TAG
    Tag(#[bpaf(long("tag"), argument("TAG"))] String),
    /// Print heads with a name containing NAME
    Name(#[bpaf(long("name"), argument("NAME"))] String),
    /// Print every head
    #[bpaf(long("all"))]
    All,
}

impl Lookup {
    /// Whether the lookup can be restricted to a category.
    fn takes_category(&self) -> bool {
        matches!(self, Lookup::Name(_) | Lookup::All)
    }

    fn find(&self, store: &CatalogStore, category: Option<&Category>) -> Vec<Entry> {
        match self {
            Lookup::Id(id) => store.by_id(*id).into_iter().collect(),
            Lookup::Uuid(uuid) => store.by_unique_id(*uuid).into_iter().collect(),
            Lookup::Value(value) => store.by_value(value).into_iter().collect(),
            Lookup::Tag(tag) => store.by_tag(tag),
            Lookup::Name(name) => store.by_name(category, name),
            Lookup::All => match category {
                Some(category) => store.all_in(category).to_vec(),
                None => store.all(),
            },
        }
    }
}

/// Reports categories that could not be refreshed on stderr.
struct ReportFailures;

impl RefreshListener for ReportFailures {
    fn category_failed(&self, failure: &CategoryRefreshFailure) {
        message::warning(failure);
    }
}

impl HeadDbArgs {
    pub async fn handle(self, config: CatalogConfig) -> Result<()> {
        self.check_category()?;

        let cache =
            CatalogCache::from_config(&config).context("Could not create the catalog client")?;
        let refreshed = refresh(&cache).await;
        cache.shutdown();
        refreshed?;

        self.print(cache.store(), &mut std::io::stdout().lock())
    }

    /// `--category` only applies to `--name` and `--all`.
    fn check_category(&self) -> Result<()> {
        match (&self.category, &self.lookup) {
            (Some(_), Some(lookup)) if !lookup.takes_category() => {
                bail!("--category can only be used with --name or --all")
            },
            (Some(_), None) => bail!("--category can only be used with --name or --all"),
            _ => Ok(()),
        }
    }

    /// Print the result of the lookup as JSON lines.
    fn print(&self, store: &CatalogStore, out: &mut impl Write) -> Result<()> {
        let category = self.category.as_deref().map(parse_category);

        let Some(lookup) = &self.lookup else {
            return print_summary(store, out);
        };

        let entries = lookup.find(store, category.as_ref());
        debug!(?lookup, found = entries.len(), "looked up heads");
        if entries.is_empty() {
            message::plain("No matching heads found");
        }
        for entry in &entries {
            writeln!(out, "{}", serde_json::to_string(entry)?)?;
        }
        Ok(())
    }
}

/// Refresh the catalog once, reporting failed categories as warnings.
async fn refresh<F: Fetch>(cache: &CatalogCache<F>) -> Result<Arc<RefreshReport>> {
    let report = cache
        .refresh_with(ReportFailures)
        .await
        .context("Could not refresh the head catalog")?;

    message::updated(format!(
        "Loaded {} heads in {} categories ({} failed)",
        report.snapshot.len(),
        report.snapshot.categories().count(),
        report.failures.len()
    ));
    Ok(report)
}

fn print_summary(store: &CatalogStore, out: &mut impl Write) -> Result<()> {
    let snapshot = store.snapshot();
    for category in snapshot.categories() {
        let line = json!({
            "category": category,
            "entries": snapshot.entries_in(category).len(),
        });
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn parse_category(name: &str) -> Category {
    match Category::known(name) {
        Some(category) => category.clone(),
        None => {
            message::warning(format!("'{name}' is not a known category"));
            Category::new(name)
        },
    }
}

#[cfg(test)]
mod tests {
    use headdb_catalog::RefreshError;
    use headdb_catalog::test_helpers::MockFetcher;
    use pretty_assertions::assert_eq;

    use super::*;

    const PRIMARY: &str = "https://primary.test/api.php";

    const ANIMALS: &str = r#"[
        {"name":"Pig","value":"pig","tags":"farm,pink"},
        {"name":"Cow","value":"cow","tags":"farm"},
        {"name":"Wolf","value":"wolf"}
    ]"#;
    const PLANTS: &str = r#"[{"name":"§2Cactus","value":"cactus","tags":"desert"}]"#;

    fn args(args: &[&str]) -> HeadDbArgs {
        head_db_args().run_inner(args).unwrap()
    }

    async fn refreshed_cache() -> CatalogCache<MockFetcher> {
        let fetcher = MockFetcher::new()
            .respond_body(format!("{PRIMARY}?cat=animals&tags=true"), ANIMALS)
            .respond_body(format!("{PRIMARY}?cat=plants&tags=true"), PLANTS);
        let cache = CatalogCache::new(fetcher, &CatalogConfig {
            primary_url: PRIMARY.to_string(),
            fallback_enabled: false,
            categories: Some(vec![Category::ANIMALS, Category::PLANTS]),
            ..Default::default()
        });
        refresh(&cache).await.unwrap();
        cache
    }

    fn names(output: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|line| {
                let entry: serde_json::Value = serde_json::from_str(line).unwrap();
                entry["name"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn parses_lookups() {
        assert_eq!(args(&["--id", "3"]).lookup, Some(Lookup::Id(3)));
        assert_eq!(args(&["--tag", "farm"]).lookup, Some(Lookup::Tag("farm".into())));
        assert_eq!(args(&[]).lookup, None);

        let all = args(&["--all", "--category", "plants", "-vv"]);
        assert_eq!(all.lookup, Some(Lookup::All));
        assert_eq!(all.category.as_deref(), Some("plants"));
        assert!(matches!(all.verbosity, Verbosity::Verbose(2)));

        assert!(head_db_args().run_inner(&["--id", "three"]).is_err());
    }

    #[test]
    fn category_requires_name_or_all() {
        assert!(args(&["--name", "pig", "--category", "animals"]).check_category().is_ok());
        assert!(args(&["--all", "--category", "animals"]).check_category().is_ok());
        assert!(args(&["--id", "3"]).check_category().is_ok());

        for lookup in [&["--id", "3"][..], &["--tag", "farm"], &["--value", "pig"], &[]] {
            let args = args(&[lookup, &["--category", "animals"]].concat());
            let err = args.check_category().unwrap_err();
            assert_eq!(
                err.to_string(),
                "--category can only be used with --name or --all"
            );
        }
    }

    #[tokio::test]
    async fn prints_matching_heads_as_json_lines() {
        let cache = refreshed_cache().await;

        let mut out = Vec::new();
        args(&["--tag", "FARM"])
            .print(cache.store(), &mut out)
            .unwrap();
        assert_eq!(names(&out), ["Pig", "Cow"]);

        let mut out = Vec::new();
        args(&["--name", "cactus", "--category", "plants"])
            .print(cache.store(), &mut out)
            .unwrap();
        assert_eq!(names(&out), ["§2Cactus"]);

        let mut out = Vec::new();
        args(&["--all", "--category", "animals"])
            .print(cache.store(), &mut out)
            .unwrap();
        assert_eq!(names(&out), ["Pig", "Cow", "Wolf"]);
    }

    #[tokio::test]
    async fn missing_head_prints_nothing() {
        let cache = refreshed_cache().await;

        let mut out = Vec::new();
        args(&["--id", "42"])
            .print(cache.store(), &mut out)
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn summary_counts_heads_per_category() {
        let cache = refreshed_cache().await;

        let mut out = Vec::new();
        args(&[]).print(cache.store(), &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"category\":\"animals\",\"entries\":3}\n{\"category\":\"plants\",\"entries\":1}\n"
        );
    }

    #[tokio::test]
    async fn failed_refresh_is_an_error() {
        let cache = CatalogCache::new(MockFetcher::new(), &CatalogConfig {
            primary_url: PRIMARY.to_string(),
            fallback_enabled: false,
            categories: Some(vec![Category::ANIMALS]),
            ..Default::default()
        });

        let err = refresh(&cache).await.unwrap_err();

        assert!(
            matches!(
                err.downcast_ref::<RefreshError>(),
                Some(RefreshError::AllCategoriesFailed { .. })
            ),
            "expected RefreshError::AllCategoriesFailed, found: {err:?}"
        );
    }
}
