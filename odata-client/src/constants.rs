//! OData protocol constants shared across the client

// Path segments
pub const BATCH: &str = "$batch";
pub const METADATA: &str = "$metadata";
pub const REF: &str = "$ref";
pub const VALUE: &str = "$value";
pub const COUNT: &str = "$count";
pub const QUERY: &str = "$query";
pub const ID: &str = "$id";

// Versions
pub const VERSION_4_0: &str = "4.0";
pub const VERSION_3_0: &str = "3.0";
pub const VERSION_2_0: &str = "2.0";
pub const DEFAULT_VERSION: &str = VERSION_4_0;

// Headers
pub const ODATA_VERSION: &str = "OData-Version";
pub const ODATA_VERSION_HEADERS: [&str; 3] =
    ["OData-Version", "odata-version", "DataServiceVersion"];
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_ID: &str = "Content-ID";
pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
pub const ACCEPT: &str = "Accept";
pub const PREFER: &str = "Prefer";
pub const IF_MATCH: &str = "If-Match";
pub const IF_NONE_MATCH: &str = "If-None-Match";
pub const ETAG: &str = "ETag";
pub const LOCATION: &str = "Location";

// Content types
pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_PLAIN: &str = "text/plain";
pub const ANY: &str = "*/*";
pub const MULTIPART_MIXED: &str = "multipart/mixed";
pub const MULTIPART_MIXED_BOUNDARY: &str = "multipart/mixed;boundary=";
pub const APPLICATION_HTTP: &str = "application/http";
pub const BINARY: &str = "binary";
pub const BOUNDARY_PREFIX_SUFFIX: &str = "--";
pub const BATCH_PREFIX: &str = "batch_";
pub const CHANGESET_PREFIX: &str = "changeset_";
pub const HTTP11: &str = "HTTP/1.1";
pub const NEWLINE: &str = "\r\n";

// Instance annotations
pub const ODATA_ANNOTATION_PREFIX: &str = "@odata";
pub const ODATA_CONTEXT: &str = "@odata.context";
pub const ODATA_COUNT: &str = "@odata.count";
pub const ODATA_NEXTLINK: &str = "@odata.nextLink";
pub const ODATA_DELTALINK: &str = "@odata.deltaLink";
pub const ODATA_ID: &str = "@odata.id";
pub const ODATA_ETAG: &str = "@odata.etag";
pub const ODATA_TYPE: &str = "@odata.type";
pub const ODATA_READLINK: &str = "@odata.readLink";
pub const ODATA_EDITLINK: &str = "@odata.editLink";
pub const ODATA_MEDIA_READLINK: &str = "@odata.mediaReadLink";
pub const ODATA_MEDIA_EDITLINK: &str = "@odata.mediaEditLink";
pub const ODATA_MEDIA_CONTENTTYPE: &str = "@odata.mediaContentType";
pub const ODATA_MEDIA_ETAG: &str = "@odata.mediaEtag";

// Version 2 envelope
pub const V2_ENVELOPE: &str = "d";
pub const V2_RESULTS: &str = "results";
pub const V2_METADATA: &str = "__metadata";
pub const V2_COUNT: &str = "__count";
pub const V2_NEXT: &str = "__next";

// Query parameters that can appear in a next link
pub const SKIP: &str = "$skip";
pub const SKIPTOKEN: &str = "$skiptoken";

// Edm primitive types
pub const EDM_STRING: &str = "Edm.String";
pub const EDM_INT16: &str = "Edm.Int16";
pub const EDM_INT32: &str = "Edm.Int32";
pub const EDM_INT64: &str = "Edm.Int64";
pub const EDM_BYTE: &str = "Edm.Byte";
pub const EDM_SBYTE: &str = "Edm.SByte";
pub const EDM_SINGLE: &str = "Edm.Single";
pub const EDM_DOUBLE: &str = "Edm.Double";
pub const EDM_DECIMAL: &str = "Edm.Decimal";
pub const EDM_BOOLEAN: &str = "Edm.Boolean";
pub const EDM_GUID: &str = "Edm.Guid";
pub const EDM_DATE: &str = "Edm.Date";
pub const EDM_TIME_OF_DAY: &str = "Edm.TimeOfDay";
pub const EDM_DATETIME_OFFSET: &str = "Edm.DateTimeOffset";
pub const EDM_DURATION: &str = "Edm.Duration";
pub const EDM_BINARY: &str = "Edm.Binary";
pub const EDM_STREAM: &str = "Edm.Stream";

/// Client-side correlation id field injected into entity payloads kept by models
pub const CID_FIELD: &str = "_cid";
