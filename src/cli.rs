use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "zipkit")]
#[command(version)]
#[command(about = "Create, list and extract ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipkit -c out.zip hello.txt readme.txt   create out.zip from two files\n  \
  zipkit data1.zip -x joe                  extract all files except joe from data1.zip\n  \
  zipkit -p foo.zip | more                 send contents of foo.zip via pipe into more\n  \
  zipkit -v archive.zip                    list archive.zip with sizes and dates")]
pub struct Cli {
    /// ZIP file path
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all), or files to add with -c
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// Create FILE from FILES instead of reading it
    #[arg(short = 'c')]
    pub create: bool,

    /// Deflate entries when creating (default: store)
    #[arg(short = 'Z', requires = "create")]
    pub deflate: bool,

    /// Archive comment when creating
    #[arg(short = 'z', value_name = "COMMENT", requires = "create")]
    pub comment: Option<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely/show version info
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Fail entries whose CRC-32 does not match their contents
    #[arg(long)]
    pub verify_crc: bool,

    /// Also extract __MACOSX/ resource-fork entries
    #[arg(long)]
    pub keep_macos: bool,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }
}
