/*
 * lib.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Staffetta, an HTTP content codec and transfer library.
 *
 * Staffetta is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Staffetta is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Staffetta.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Staffetta: an HTTP content codec and transfer library.
//!
//! Three layers, leaves first. [`codec`] holds stateless byte transforms
//! (percent escaping, manual UTF-8 expansion, Base64, lexical path
//! normalization). [`content`] and [`fragment`] split finished buffers at
//! the CRLFCRLF terminator into header indexes plus body bytes. On top of
//! those sit the two streaming components: [`ingest`] decodes multipart
//! request bodies against a declared length, routing file-bearing parts to
//! disk, and [`connector`] performs outbound HTTP(S) fetches over blocking
//! sockets, with proxy and CONNECT tunneling support, attaching a
//! process-unique [`signature`] token to every response.
//!
//! All I/O is synchronous and blocking; each decode or fetch owns its
//! sockets and buffers for its lifetime and releases them on every exit
//! path. The only shared mutable state is the signature counter.

pub mod codec;
pub mod connector;
pub mod content;
pub mod fragment;
pub mod ingest;
pub mod pace;
pub mod signature;

pub use codec::{decode, encode, normalize, Coding};
pub use connector::{
    Connector, ConnectorConfig, ConnectorError, FetchMode, RequestBody, TlsProtocol, TrustMode,
};
pub use content::{Content, ContentBuilder};
pub use fragment::{Fragment, FragmentDraft};
pub use ingest::{Ingest, IngestConfig, IngestError, Ingested};
pub use signature::{is_valid_signature, next_signature, SignatureSource};
