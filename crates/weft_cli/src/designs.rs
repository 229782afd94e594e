//! `weft designs`: list the design catalog.


/// Runs the `weft designs` command, printing one design per line to stdout.
pub fn run() -> Result<i32, Box<dyn std::error::Error>> {
    for line in catalog_lines() {
        println!("{line}");
    }
    Ok(0)
}

fn catalog_lines() -> Vec<String> {
    let width = weft_designs::catalog()
        .iter()
        .map(|d| d.name.len())
        .max()
        .unwrap_or(0);
    weft_designs::catalog()
        .iter()
        .map(|d| format!("{:width$}  top {:6}  {}", d.name, d.top, d.description))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_design_is_listed() {
        let lines = catalog_lines();
        assert_eq!(lines.len(), weft_designs::catalog().len());
        assert!(lines[0].starts_with("esi_ram "));
        assert!(lines.iter().any(|l| l.starts_with("esi_ram_host")));
        assert!(lines.iter().all(|l| l.contains("top Top")));
    }
}
