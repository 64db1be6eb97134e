pub const THIS_IS_A_BUG: &str =
    "- this is a bug please report it: https://github.com/httpfile/httpfile/issues";

/// Separator between the scheme and the rest of a stream-style destination.
pub const SCHEME_SEPARATOR: &str = "://";

/// Scheme that designates a plain local path written as an URL.
pub const FILE_SCHEME: &str = "file";

/// environment variable which can be used to override the upload temporary directory
pub const HTTPFILE_UPLOAD_TMP_DIR: &str = "HTTPFILE_UPLOAD_TMP_DIR";
