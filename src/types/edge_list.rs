use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::READ_BUFFER_SIZE;
use crate::error::NetworkError;
use crate::types::graph_query::GraphQuery;
use crate::types::vertex_id::VertexId;
use crate::types::Network;

/// Default field delimiter of the edge-list format.
pub const DEFAULT_DELIMITER: &str = "|";

/// Reads a network from a delimited edge-list file.
///
/// # File Format
/// One record per line, fields separated by `delimiter` and trimmed:
/// - `a` or `a|`: vertex `a` with no edge
/// - `a|b`: edge from `a` to `b` with weight 1.0
/// - `a|b|w`: edge from `a` to `b` with weight `w` (1.0 if `w` does not parse)
///
/// Blank lines, lines starting with an empty source (`|b`) and lines with more
/// than three fields are skipped. Self-edges are skipped with a warning.
///
/// # Arguments
/// * `file_path` - Path to the edge-list file
/// * `delimiter` - Field separator
/// * `directed` - Whether the resulting network is directed
///
/// # Errors
/// * `NetworkError::Io` if the file cannot be opened or read
/// * `NetworkError::EmptyField` if a weighted record has an empty endpoint
pub fn read_network_from_file<P: AsRef<Path>>(
    file_path: P,
    delimiter: &str,
    directed: bool,
) -> Result<Network<String>, NetworkError> {
    let file = File::open(file_path.as_ref())?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
    let mut network = Network::new(directed);

    // Setup progress bar over bytes consumed
    let pb = ProgressBar::new(file_len);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"));
    pb.set_message("Network Loading.");

    let mut line = String::new();
    let mut line_number = 0usize;
    loop {
        line.clear();
        let read_len = reader.read_line(&mut line)?;
        if read_len == 0 {
            break;
        }
        line_number += 1;
        pb.inc(read_len as u64);
        parse_record(&mut network, &line, delimiter, line_number)?;
    }
    pb.finish_and_clear();

    info!(
        order = network.order(),
        size = network.size(),
        directed,
        "loaded network from {}",
        file_path.as_ref().display()
    );
    Ok(network)
}

/// Applies one edge-list record to the network.
fn parse_record(
    network: &mut Network<String>,
    line: &str,
    delimiter: &str,
    line_number: usize,
) -> Result<(), NetworkError> {
    let fields = line.split(delimiter).map(str::trim).collect::<Vec<_>>();
    match fields.as_slice() {
        [""] | ["", _] => {}
        [vertex] | [vertex, ""] => network.add_vertex(vertex.to_string()),
        [from, to] => add_edge_or_warn(network, from, to, 1.0, line_number),
        [from, to, weight] => {
            if from.is_empty() || to.is_empty() {
                return Err(NetworkError::EmptyField { line: line_number });
            }
            let weight = weight.parse::<f32>().unwrap_or(1.0);
            add_edge_or_warn(network, from, to, weight, line_number);
        }
        _ => {}
    }
    Ok(())
}

fn add_edge_or_warn(network: &mut Network<String>, from: &str, to: &str, weight: f32, line_number: usize) {
    if let Err(err) = network.add_edge(from.to_string(), to.to_string(), weight) {
        warn!("line {}: {}", line_number, err);
    }
}

/// Writes a network in the edge-list format understood by `read_network_from_file`.
///
/// Each stored edge becomes one `from|to|weight` line; vertices without any
/// incident edge are written as a bare vertex line.
pub fn write_network_to_file<V, P>(
    network: &Network<V>,
    file_path: P,
    delimiter: &str,
) -> Result<(), NetworkError>
where
    V: VertexId + Display,
    P: AsRef<Path>,
{
    let mut writer = BufWriter::new(File::create(file_path)?);
    for (from, to, weight) in network.edges() {
        writeln!(writer, "{}{}{}{}{}", from, delimiter, to, delimiter, weight)?;
    }
    for vertex in network.vertex_list() {
        if network.degree(&vertex)? == 0 {
            writeln!(writer, "{}", vertex)?;
        }
    }
    writer.flush()?;
    Ok(())
}
