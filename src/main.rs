fn main() -> anyhow::Result<()> {
    hictk::cli::run()
}
