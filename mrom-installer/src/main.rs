fn main() -> anyhow::Result<()> {
    mrom_installer::run()
}
