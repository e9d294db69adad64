use gridlife::sim::SimConfig;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    gridlife::run(SimConfig::default())
}
