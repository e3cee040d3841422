//! AES-256-CTR decryption as a streaming reader.
//!
//! Encrypted archives start with a 16-byte IV followed by the ciphertext.

use crate::config::KEY_LEN;
use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

pub(crate) type Aes256Ctr = ctr::Ctr128BE<Aes256>;

pub const IV_LEN: usize = 16;

pub struct DecryptReader<R> {
    inner: R,
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
    iv_filled: usize,
    cipher: Option<Aes256Ctr>,
}

impl<R> DecryptReader<R> {
    pub fn new(inner: R, key: [u8; KEY_LEN]) -> Self {
        Self {
            inner,
            key,
            iv: [0u8; IV_LEN],
            iv_filled: 0,
            cipher: None,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for DecryptReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        // The IV may arrive across several reads
        while this.cipher.is_none() {
            let mut header = ReadBuf::new(&mut this.iv[this.iv_filled..]);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut header))?;
            let n = header.filled().len();
            if n == 0 {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "encrypted archive is shorter than its IV header",
                )));
            }
            this.iv_filled += n;
            if this.iv_filled == IV_LEN {
                let cipher = Aes256Ctr::new_from_slices(&this.key, &this.iv)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
                this.cipher = Some(cipher);
            }
        }

        let start = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        if let Some(cipher) = this.cipher.as_mut() {
            cipher.apply_keystream(&mut buf.filled_mut()[start..]);
        }
        Poll::Ready(Ok(()))
    }
}
