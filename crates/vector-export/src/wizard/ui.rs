//! Console output of the export command.

use console::{style, Style};

use crate::pipeline::ExportReport;

/// Console UI handler.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExportUI;

impl ExportUI {
    /// Creates a new UI handler.
    pub fn new() -> Self {
        Self
    }

    /// Prints the command header.
    pub fn print_header(&self) {
        let cyan = Style::new().cyan().bold();
        println!();
        println!("{}", cyan.apply_to("VECTOR EXPORT"));
        println!(
            "{}",
            style("Pinecone, Weaviate and Qdrant to SQLite and Parquet").dim()
        );
        println!();
    }

    /// Reports an unknown backend name.
    pub fn print_invalid_backend(&self, name: &str) {
        println!(
            "{} Invalid vector database '{}'. Choose pinecone, weaviate or qdrant.",
            style("!").yellow().bold(),
            name
        );
    }

    /// Prints the per-collection summary of a run.
    pub fn print_summary(&self, report: &ExportReport) {
        let bold = Style::new().bold();
        let dim = Style::new().dim();

        println!();
        println!(
            "{} {} ({})",
            bold.apply_to("Source:"),
            report.backend,
            dim.apply_to(&report.model_name)
        );
        if report.collections.is_empty() {
            println!("   {}", dim.apply_to("no collections exported"));
        }
        for stats in &report.collections {
            println!(
                "   {} {:>10} rows  {:>7.1}s  {}",
                bold.apply_to(format!("{:<24}", stats.collection)),
                stats.rows,
                stats.duration_secs,
                dim.apply_to(stats.parquet_path.display())
            );
        }
        println!(
            "   {} {} rows in {:.1}s",
            bold.apply_to("Total:"),
            report.total_rows(),
            report.duration_secs
        );
        println!();
    }

    /// Prints the completion line.
    pub fn print_completed(&self) {
        println!("{}", style("Export completed.").green().bold());
    }

    /// Prints error message.
    pub fn print_error(&self, message: &str) {
        eprintln!("{} {}", style("error:").red().bold(), message);
    }
}
