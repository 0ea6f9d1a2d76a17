use connslot::config::Config;
use connslot::handler::Router;
use connslot::server::Server;

fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(cfg.log_level()?)
        .init();

    let router = Router::builtin(&cfg);
    let mut server = Server::from_config(&cfg, router)?;
    server.run()?;

    Ok(())
}
