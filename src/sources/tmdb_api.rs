use crate::client::{BearerTokenAuth, RestClient};
use crate::config::Config;
use crate::paginator::Paginator;
use crate::resource::{Resource, Source, Transformer};
use crate::selector::DataSelector;
use crate::transform::watch_providers_selector;
use crate::Result;

pub const SOURCE_NAME: &str = "api_tmdb";

/// Top-rated movies and TV shows, their genres, and where to watch them.
#[derive(Debug, Clone)]
pub struct TmdbAPI<'a> {
    config: &'a Config,
}

impl TmdbAPI<'_> {
    pub fn new(config: &Config) -> TmdbAPI {
        TmdbAPI { config }
    }

    fn client(&self) -> Result<RestClient> {
        RestClient::new(
            &self.config.sources.api.tmdb.base_url,
            BearerTokenAuth::from_secrets(
                &self.config.secrets,
                &self.config.sources.api.tmdb.token_secret,
            ),
            &self.config.http,
        )
    }

    fn top_rated(name: &str, path: &str) -> Result<Resource> {
        Ok(Resource::builder(name, path)
            .paginator(Paginator::page_number(1, "page", "total_pages")?)
            .data_selector(DataSelector::path("results")?)
            .parallelized(true)
            .build())
    }

    fn genres(name: &str, path: &str) -> Result<Resource> {
        Ok(Resource::builder(name, path)
            .paginator(Paginator::SinglePage)
            .data_selector(DataSelector::path("genres")?)
            .parallelized(true)
            .build())
    }

    fn watch_providers(&self, name: &str, upstream: &Resource, path: &str) -> Transformer {
        let regions = self.config.sources.api.tmdb.regions.clone();

        Transformer::builder(name, upstream, path)
            .paginator(Paginator::SinglePage)
            .data_selector(DataSelector::root())
            .parallelized(true)
            .add_map(move |data| watch_providers_selector(&data, &regions))
            .build()
    }

    pub fn source(&self) -> Result<Source> {
        let movie = Self::top_rated("movie", "movie/top_rated")?;
        let tv = Self::top_rated("tv", "tv/top_rated")?;
        let movie_genres = Self::genres("movie_genres", "genre/movie/list")?;
        let tv_genres = Self::genres("tv_genres", "genre/tv/list")?;
        let movie_watch_providers = self.watch_providers(
            "movie_watch_providers_availability",
            &movie,
            "movie/{id}/watch/providers",
        );
        let tv_watch_providers = self.watch_providers(
            "tv_watch_providers_availability",
            &tv,
            "tv/{id}/watch/providers",
        );

        Source::new(
            SOURCE_NAME,
            self.client()?,
            vec![
                movie.into(),
                tv.into(),
                movie_genres.into(),
                tv_genres.into(),
                movie_watch_providers.into(),
                tv_watch_providers.into(),
            ],
        )
    }
}
