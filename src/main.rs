fn main() -> anyhow::Result<()> {
    zai::main_inner()
}
