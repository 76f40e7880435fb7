#[tokio::main]
async fn main() -> collector::Result<()> {
    collector::init_tracing();
    tracing::info!(
        version = collector::version::VERSION,
        git_sha = collector::version::GIT_SHA,
        dirty = collector::version::GIT_DIRTY,
        built_at = collector::version::BUILD_TIMESTAMP,
        "collector starting"
    );
    collector::run().await
}
