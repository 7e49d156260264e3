use structopt::StructOpt;

use std::{ffi, process};

use hashdb::{
    commands,
    settings::{BloomSettings, Config, HashDigestKind},
};

/// Options for the `hashdb` command.
#[derive(StructOpt)]
pub struct Opt {
    #[structopt(subcommand)]
    subcmd: SubCommand,
}

#[derive(Clone, StructOpt)]
pub enum SubCommand {
    /// Materialize an empty database directory.
    Create {
        #[structopt(long = "dir", help = "database directory to create")]
        dir: ffi::OsString,

        #[structopt(long = "hashdigest-type", default_value = "MD5", help = "MD5|SHA1|SHA256|STRAIGHT16|STRAIGHT64")]
        hashdigest_type: String,

        #[structopt(long = "hash-block-size", default_value = "4096")]
        hash_block_size: u64,

        #[structopt(long = "max-duplicates", default_value = "0", help = "0 means unlimited")]
        max_duplicates: u32,

        #[structopt(long = "index-bits", default_value = "36", help = "number_of_index_bits, in [32,40]")]
        index_bits: u32,

        #[structopt(long = "no-bloom1", help = "disable the primary bloom filter")]
        no_bloom1: bool,

        #[structopt(long = "bloom2", help = "enable the secondary bloom filter")]
        bloom2: bool,
    },
    /// Ingest hashes from `src` (a hashdb directory or a minimal DFXML-line
    /// file) into `dst`.
    Copy {
        #[structopt(long = "src")]
        src: ffi::OsString,
        #[structopt(long = "dst")]
        dst: ffi::OsString,
    },
    /// Remove hashes named in `src` from `dst`.
    Remove {
        #[structopt(long = "src")]
        src: ffi::OsString,
        #[structopt(long = "dst")]
        dst: ffi::OsString,
    },
    /// Union two databases into a freshly created third.
    Merge {
        #[structopt(long = "in1")]
        in1: ffi::OsString,
        #[structopt(long = "in2")]
        in2: ffi::OsString,
        #[structopt(long = "out")]
        out: ffi::OsString,
    },
    /// Rewrite the bloom files from the primary hash store.
    RebuildBloom {
        #[structopt(long = "dir")]
        dir: ffi::OsString,

        #[structopt(long = "bloom1-m-hash-size")]
        bloom1_m_hash_size: u32,

        #[structopt(long = "bloom1-k-hash-functions", default_value = "3")]
        bloom1_k_hash_functions: u32,

        #[structopt(long = "no-bloom1")]
        no_bloom1: bool,

        #[structopt(long = "bloom2")]
        bloom2: bool,

        #[structopt(long = "bloom2-m-hash-size", default_value = "24")]
        bloom2_m_hash_size: u32,

        #[structopt(long = "bloom2-k-hash-functions", default_value = "3")]
        bloom2_k_hash_functions: u32,
    },
    /// Write a minimal DFXML-line document of every triple in `dir`.
    Export {
        #[structopt(long = "dir")]
        dir: ffi::OsString,
        #[structopt(long = "dfxml")]
        dfxml: ffi::OsString,
    },
    /// Print counters and store sizes for `dir` to stdout.
    Info {
        #[structopt(long = "dir")]
        dir: ffi::OsString,
    },
    /// Run the scan-only TCP server.
    Server {
        #[structopt(long = "dir")]
        dir: ffi::OsString,
        #[structopt(long = "port")]
        port: u16,
        #[structopt(long = "pool-size")]
        pool_size: Option<usize>,
    },
}

fn main() {
    env_logger::init();

    let opts = Opt::from_iter(std::env::args_os());
    if let Err(err) = handle(opts) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn handle(opts: Opt) -> hashdb::Result<()> {
    match opts.subcmd {
        SubCommand::Create {
            dir,
            hashdigest_type,
            hash_block_size,
            max_duplicates,
            index_bits,
            no_bloom1,
            bloom2,
        } => {
            let mut cfg = Config::new();
            cfg.set_hashdigest_type(HashDigestKind::parse(&hashdigest_type)?)
                .set_hash_block_size(hash_block_size)
                .set_maximum_hash_duplicates(max_duplicates)
                .set_number_of_index_bits(index_bits);
            if no_bloom1 {
                cfg.set_bloom1(BloomSettings {
                    used: false,
                    ..BloomSettings::default()
                });
            }
            if bloom2 {
                cfg.set_bloom2(BloomSettings::default());
            }
            commands::create(&dir, cfg.finalize()?)
        }
        SubCommand::Copy { src, dst } => commands::copy(&src, &dst).map(|changes| {
            println!("{}", changes.report());
        }),
        SubCommand::Remove { src, dst } => commands::remove(&src, &dst).map(|changes| {
            println!("{}", changes.report());
        }),
        SubCommand::Merge { in1, in2, out } => commands::merge(&in1, &in2, &out).map(|changes| {
            println!("{}", changes.report());
        }),
        SubCommand::RebuildBloom {
            dir,
            bloom1_m_hash_size,
            bloom1_k_hash_functions,
            no_bloom1,
            bloom2,
            bloom2_m_hash_size,
            bloom2_k_hash_functions,
        } => {
            let db = hashdb::manager::Database::open(&dir)?;
            let mut settings = db.settings().clone();
            db.close()?;
            settings.bloom1 = BloomSettings {
                used: !no_bloom1,
                k_hash_functions: bloom1_k_hash_functions,
                m_hash_size: bloom1_m_hash_size,
            };
            settings.bloom2 = BloomSettings {
                used: bloom2,
                k_hash_functions: bloom2_k_hash_functions,
                m_hash_size: bloom2_m_hash_size,
            };
            commands::rebuild_bloom(&dir, settings)
        }
        SubCommand::Export { dir, dfxml } => commands::export(&dir, &dfxml).map(|n| {
            println!("exported {} triples", n);
        }),
        SubCommand::Info { dir } => commands::info(&dir).map(|report| {
            print!("{}", report);
        }),
        SubCommand::Server { dir, port, pool_size } => commands::server(&dir, port, pool_size),
    }
}
