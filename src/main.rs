fn main() -> anyhow::Result<()> {
    strata_notes::cli::run()
}
