use std::collections::BTreeMap;

use rsq_warehouse::{ObjectStorage, PathFactory, DEFAULT_BATCH_SIZE};

/// Merges the Parquet parts of one day into a single object.
///
/// Usage: `cargo run --example merge -- <bucket> <region> <yyyymmdd>`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(bucket), Some(region), Some(date)) = (args.next(), args.next(), args.next()) else {
        anyhow::bail!("usage: merge <bucket> <region> <yyyymmdd>");
    };

    let storage = ObjectStorage::from_env(bucket)?;
    let paths = PathFactory::new();
    let params = BTreeMap::from([("region", region.as_str()), ("date", date.as_str())]);

    let folder = paths.generate("{region}/parts/{date}", &params)?;
    let output = paths.generate("{region}/merged/{date}.parquet", &params)?;

    let files: Vec<String> = storage
        .get_directory(&folder)
        .await?
        .into_iter()
        .map(|name| format!("{folder}{name}"))
        .collect();
    println!("merging {} objects from {folder}", files.len());

    storage
        .combine_parquet_files(&output, &files, DEFAULT_BATCH_SIZE)
        .await?;
    println!("wrote {output}");

    Ok(())
}
