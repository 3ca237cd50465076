use anyhow::Result;

fn main() -> Result<()> {
    penguin_tui::cli::run()
}
