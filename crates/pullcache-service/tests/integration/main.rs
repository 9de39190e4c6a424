mod diagnostics;
mod utils;
