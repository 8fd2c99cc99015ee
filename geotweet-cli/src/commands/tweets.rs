//! Tweet search against a running server

use anyhow::Result;
use clap::Args;
use geotweet_server::models::{TweetParams, Tweets};

use super::client::{ServerArgs, ServerClient};
use crate::config::GeotweetConfig;

/// Arguments for the tweets command
#[derive(Args, Debug)]
pub struct TweetsArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Northern latitude bound
    #[arg(long, allow_hyphen_values = true)]
    pub north: Option<f64>,

    /// Southern latitude bound
    #[arg(long, allow_hyphen_values = true)]
    pub south: Option<f64>,

    /// Eastern longitude bound
    #[arg(long, allow_hyphen_values = true)]
    pub east: Option<f64>,

    /// Western longitude bound
    #[arg(long, allow_hyphen_values = true)]
    pub west: Option<f64>,

    /// Earliest time (RFC 3339, YYYY-MM-DD or epoch milliseconds)
    #[arg(long)]
    pub mindate: Option<String>,

    /// Latest time (RFC 3339, YYYY-MM-DD or epoch milliseconds)
    #[arg(long)]
    pub maxdate: Option<String>,

    /// Index of the first tweet to return
    #[arg(long)]
    pub offset: Option<i64>,

    /// Print the raw JSON response
    #[arg(long)]
    pub json: bool,
}

impl TweetsArgs {
    fn params(&self) -> TweetParams {
        TweetParams {
            north: self.north,
            south: self.south,
            east: self.east,
            west: self.west,
            mindate: self.mindate.clone(),
            maxdate: self.maxdate.clone(),
            offset: self.offset,
        }
    }
}

/// Build the query string, leaving out unset parameters.
fn query_pairs(params: &TweetParams) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    let numbers = [
        ("north", params.north),
        ("south", params.south),
        ("east", params.east),
        ("west", params.west),
    ];
    for (name, value) in numbers {
        if let Some(value) = value {
            pairs.push((name, value.to_string()));
        }
    }
    if let Some(value) = &params.mindate {
        pairs.push(("mindate", value.clone()));
    }
    if let Some(value) = &params.maxdate {
        pairs.push(("maxdate", value.clone()));
    }
    if let Some(offset) = params.offset {
        pairs.push(("offset", offset.to_string()));
    }
    pairs
}

pub async fn run_tweets(args: TweetsArgs, config: &GeotweetConfig) -> Result<()> {
    let client = ServerClient::new(config, &args.server)?;
    let query = query_pairs(&args.params());
    let result = client.get_json::<Tweets>("tweet", &query).await;
    client.close().await;
    let tweets = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&tweets)?);
        return Ok(());
    }

    println!(
        "{} matching tweets, showing {} from offset {}",
        tweets.total,
        tweets.tweet.len(),
        tweets.offset
    );
    for tweet in &tweets.tweet {
        println!(
            "{}  {:>9.4},{:>10.4}  @{}: {}",
            tweet.time.format("%Y-%m-%d %H:%M:%S"),
            tweet.lat,
            tweet.lon,
            tweet.userid,
            tweet.text
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_parameters_are_omitted() {
        let params = TweetParams {
            north: Some(40.5),
            west: Some(-85.0),
            offset: Some(1000),
            ..TweetParams::default()
        };
        let pairs = query_pairs(&params);
        assert_eq!(
            pairs,
            vec![
                ("north", "40.5".to_string()),
                ("west", "-85".to_string()),
                ("offset", "1000".to_string()),
            ]
        );
        assert!(query_pairs(&TweetParams::default()).is_empty());
    }
}
