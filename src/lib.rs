use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

pub mod alphabet;
pub mod bitio;
pub mod container;
pub mod decoder;
pub mod dfa;
pub mod dict;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod io;
pub mod node;
pub mod sam;
pub mod search;
pub mod signature;
pub mod sync;

use bitio::{BitReader, BitWriter};
use decoder::Decoder;
use encoder::Encoder;
use engine::{Algorithm, SearchEngine};

const FASTA_WIDTH: usize = 60;

/// Reference-based DNA compressor with compressed-domain pattern search.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress pairwise alignments into a container
    Compress {
        /// Synchronization period (minimum unchanged run in adaptive mode);
        /// 0 disables synchronization
        #[arg(short = 's', long, default_value_t = 200)]
        sync_period: u64,

        /// Derive an adaptive sync schedule from the alignments
        #[arg(short = 'a', long)]
        adaptive: bool,

        /// Output file [default: stdout]
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Pairwise alignments in FASTA format (plain or .gz)
        #[arg(required = true)]
        alignments: Vec<PathBuf>,
    },

    /// Decompress a container into FASTA files, one per stored name
    Decompress {
        /// Reference sequence in FASTA format
        reference: PathBuf,
        /// Compressed container ("-" for stdin)
        container: PathBuf,
    },

    /// Search compressed sequences for patterns read from stdin
    Search {
        /// Pattern-matching algorithm
        #[arg(short = 'a', long, value_enum, default_value = "lm")]
        algorithm: Algorithm,
        /// Reference sequence in FASTA format
        reference: PathBuf,
        /// Compressed container
        container: PathBuf,
    },

    /// Convert SAM alignments into FASTA pairwise alignments
    Sam2fasta {
        /// Reference sequence in FASTA format
        reference: PathBuf,
        /// Alignments in SAM text format
        #[arg(required = true)]
        sam_files: Vec<PathBuf>,
    },

    /// Extract aligned sequences from SAM files as plain text
    Sam2seq {
        /// Reference sequence in FASTA format
        reference: PathBuf,
        /// Alignments in SAM text format
        #[arg(required = true)]
        sam_files: Vec<PathBuf>,
    },
}

pub fn run_with_args(args: Args) -> anyhow::Result<()> {
    match args.command {
        Command::Compress {
            sync_period,
            adaptive,
            output,
            alignments,
        } => run_compress(sync_period, adaptive, output.as_deref(), &alignments),
        Command::Decompress {
            reference,
            container,
        } => run_decompress(&reference, &container),
        Command::Search {
            algorithm,
            reference,
            container,
        } => run_search(algorithm, &reference, &container),
        Command::Sam2fasta {
            reference,
            sam_files,
        } => run_sam2fasta(&reference, &sam_files),
        Command::Sam2seq {
            reference,
            sam_files,
        } => run_sam2seq(&reference, &sam_files),
    }
}

fn run_compress(
    sync_period: u64,
    adaptive: bool,
    output: Option<&Path>,
    alignment_files: &[PathBuf],
) -> anyhow::Result<()> {
    let mut alignments = Vec::with_capacity(alignment_files.len());
    for path in alignment_files {
        alignments.push(io::load_alignment(path)?);
    }

    let sync_map = if adaptive {
        Some(sync::sync_map(&alignments)?)
    } else {
        None
    };

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path).with_context(|| path.display().to_string())?),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut out = BitWriter::new(BufWriter::new(sink));

    let names: Vec<String> = alignment_files
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    container::write_header(&mut out, &names)?;

    let mut enc = Encoder::new(sync_period);
    let mut total_len = 0usize;
    for (path, a) in alignment_files.iter().zip(&alignments) {
        eprintln!("{}", path.display());
        total_len += alphabet::gapless_len(&a[1]);
        enc.encode(&a[0], &a[1], &mut out, sync_map.as_deref())?;
    }
    out.flush()?;

    print_stats(&enc, total_len);
    Ok(())
}

fn print_stats(enc: &Encoder, total_len: usize) {
    let st = enc.stats();
    let bits = enc.bits();
    let bpb = |bits: u64, n: u64| if n > 0 { bits as f64 / n as f64 } else { 0.0 };

    eprintln!("Used codewords:  {:9}", enc.used_nodes());
    eprintln!("Nodes in memory: {:9}", enc.real_nodes());
    eprintln!();
    eprintln!("Length of compressed sequences: {total_len}");
    eprintln!("Compressed size: {} B", (bits + 7) >> 3);
    if total_len > 0 {
        eprintln!("    ratio: {:9.4} %", 100.0 * bits as f64 / (total_len as f64 * 2.0));
        eprintln!("    bpb:   {:9.4}", bits as f64 / total_len as f64);
    }
    eprintln!(
        "    M/Rs:    {:9} B ({:7.4} bpb)",
        st.mm_bits / 8,
        bpb(st.mm_bits, st.matches + st.mismatches)
    );
    eprintln!(
        "    inserts: {:9} B ({:7.4} bpb)",
        st.ins_bits / 8,
        bpb(st.ins_bits, st.inserts)
    );
    eprintln!(
        "    deletes: {:9} B ({:7.4} bpb)",
        st.del_bits / 8,
        bpb(st.del_bits, st.deletes)
    );
    eprintln!();
    eprintln!("    Matches:  {:9}", st.matches);
    eprintln!("    Replaces: {:9}", st.mismatches);
    eprintln!("    Inserts:  {:9}", st.inserts);
    eprintln!("    Deletes:  {:9}", st.deletes);
    eprintln!(
        "    M/R runs: {:9}   I runs: {} D runs: {}",
        st.mm_runs, st.ins_runs, st.del_runs
    );
    eprintln!(
        "    M/R outs: {:9}   I outs: {} D outs: {}",
        st.mm_outs, st.ins_outs, st.del_outs
    );
}

fn run_decompress(reference: &Path, container_path: &Path) -> anyhow::Result<()> {
    let rseq = io::load_reference(reference)?;

    let source: Box<dyn Read> = if container_path == Path::new("-") {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(container_path).with_context(|| container_path.display().to_string())?,
        ))
    };
    let mut input = BitReader::new(source);

    let names = container::read_header(&mut input)?;
    let mut dec = Decoder::new(rseq, false);

    if names.is_empty() {
        // anonymous sequence: plain wrapped output on stdout
        let mut seq = Vec::new();
        dec.decode_into(&mut input, &mut seq)?;
        let stdout = std::io::stdout().lock();
        let mut out = BufWriter::new(stdout);
        write_wrapped(&mut out, &seq)?;
        out.flush()?;
        return Ok(());
    }

    for name in &names {
        let out_path = format!("{name}.fa");
        eprintln!("{out_path}");
        let mut seq = Vec::new();
        dec.decode_into(&mut input, &mut seq)?;
        let mut out =
            BufWriter::new(File::create(&out_path).with_context(|| out_path.clone())?);
        writeln!(out, ">{name}")?;
        write_wrapped(&mut out, &seq)?;
        out.flush()?;
    }
    Ok(())
}

fn write_wrapped<W: Write>(out: &mut W, seq: &[u8]) -> std::io::Result<()> {
    for chunk in seq.chunks(FASTA_WIDTH) {
        out.write_all(chunk)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn run_search(algorithm: Algorithm, reference: &Path, container_path: &Path) -> anyhow::Result<()> {
    let rseq = io::load_reference(reference)?;
    let container = std::fs::read(container_path)
        .with_context(|| container_path.display().to_string())?;

    eprintln!("loading index...");
    let engine = SearchEngine::new(rseq, container)?;

    let stdin = std::io::stdin().lock();
    eprintln!("enter query:");
    for line in stdin.lines() {
        let query = line?;
        let query = query.trim();
        if query.is_empty() {
            break;
        }
        engine.search(algorithm, query, &mut |seq, offset| {
            eprintln!("match (seq: {seq}, offset: {offset})");
        })?;
        eprintln!("enter query:");
    }
    Ok(())
}

fn run_sam2fasta(reference: &Path, sam_files: &[PathBuf]) -> anyhow::Result<()> {
    let rseq = io::load_reference(reference)?;
    for path in sam_files {
        eprintln!("{}", path.display());
        let a = sam::load_alignment(&rseq, path)?;
        let out_path = format!("{}.afasta", path.display());
        let mut out =
            BufWriter::new(File::create(&out_path).with_context(|| out_path.clone())?);
        writeln!(out, ">reference sequence")?;
        write_wrapped(&mut out, &a[0])?;
        writeln!(out, ">aligned sequence")?;
        write_wrapped(&mut out, &a[1])?;
        out.flush()?;
    }
    Ok(())
}

fn run_sam2seq(reference: &Path, sam_files: &[PathBuf]) -> anyhow::Result<()> {
    let rseq = io::load_reference(reference)?;
    for path in sam_files {
        eprintln!("{}", path.display());
        let a = sam::load_alignment(&rseq, path)?;
        let seq: Vec<u8> = alphabet::strip_gaps(&a[1])
            .iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let out_path = format!("{}.seq", path.display());
        let mut out =
            BufWriter::new(File::create(&out_path).with_context(|| out_path.clone())?);
        out.write_all(&seq)?;
        out.flush()?;
    }
    Ok(())
}
