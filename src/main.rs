fn main() -> anyhow::Result<()> {
    csv_tools_lib::run()
}
