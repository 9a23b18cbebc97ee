//! The card manager
//!
//! [`CardManager`] ties a transport, an optional secure channel wrapper and
//! the GP command layer together: it locates and selects a security domain,
//! runs the mutual authentication handshake, and issues card content
//! operations through the wrapper.

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::aid::Aid;
use crate::apdu::{Command, Response};
use crate::commands::{
    delete, external_authenticate, get_status, initialize_update, install, load, select,
    InitUpdateResponse,
};
use crate::constants::{cla, get_status_p1, ins, status, KNOWN_SD_AIDS};
use crate::keyset::KeySet;
use crate::load::{LoadFile, LoadParameters};
use crate::registry::AidRegistry;
use crate::secure_channel::{ScpVariant, SecureChannelWrapper, SecurityLevel};
use crate::session::Session;
use crate::transport::CardTransport;
use crate::{Error, Result};

/// GlobalPlatform card manager bound to one transport channel
pub struct CardManager<T: CardTransport> {
    transport: T,
    wrapper: Option<SecureChannelWrapper>,
    sd_aid: Option<Aid>,
    strict: bool,
}

impl<T: CardTransport> CardManager<T> {
    /// Create a manager over a transport; strict mode starts enabled
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            wrapper: None,
            sd_aid: None,
            strict: true,
        }
    }

    /// Enable or disable strict mode. In strict mode, recoverable card
    /// conditions during selection become errors instead of warnings.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// The selected security domain, if any
    pub fn security_domain(&self) -> Option<&Aid> {
        self.sd_aid.as_ref()
    }

    /// The active secure channel wrapper, if a channel is open
    pub fn secure_channel(&self) -> Option<&SecureChannelWrapper> {
        self.wrapper.as_ref()
    }

    /// Drop the secure channel; subsequent commands go out unwrapped
    pub fn close_secure_channel(&mut self) {
        if self.wrapper.take().is_some() {
            debug!("secure channel closed");
        }
    }

    /// Exchange one command with the card, through the secure channel
    /// wrapper when one is open
    pub fn transmit(&mut self, command: &Command) -> Result<Response> {
        let bytes = match self.wrapper.as_mut() {
            Some(wrapper) => wrapper.wrap(command)?.to_bytes(),
            None => command.to_bytes(),
        };

        trace!(command = %hex::encode(&bytes), "transmitting");
        let raw = self.transport.transmit_raw(&bytes)?;
        trace!(response = %hex::encode(&raw), "received");

        let response = Response::from_bytes(&raw)?;
        match self.wrapper.as_mut() {
            Some(wrapper) => wrapper.unwrap(response),
            None => Ok(response),
        }
    }

    fn strict_warning(&self, message: &'static str) -> Result<()> {
        if self.strict {
            return Err(Error::Strict(message));
        }
        warn!("{message}");
        Ok(())
    }

    /// Select a security domain, discovering its AID from the card
    pub fn select(&mut self) -> Result<&Aid> {
        self.select_security_domain(None)
    }

    /// Select a security domain, warning if the discovered AID differs
    /// from `expected`
    pub fn select_security_domain(&mut self, expected: Option<&Aid>) -> Result<&Aid> {
        self.wrapper = None;

        // Selection by empty AID works on most cards; fall back to the
        // catalog of well-known security domain AIDs.
        if !self.try_select(None, expected)? {
            let mut found = false;
            for aid in KNOWN_SD_AIDS {
                if self.try_select(Some(aid), expected)? {
                    found = true;
                    break;
                }
            }
            if !found {
                return Err(Error::NoSecurityDomain);
            }
        }

        self.sd_aid.as_ref().ok_or(Error::NoSecurityDomain)
    }

    fn try_select(&mut self, aid: Option<&[u8]>, expected: Option<&Aid>) -> Result<bool> {
        let cmd = match aid {
            Some(aid) => select::by_name(aid),
            None => select::issuer_security_domain(),
        };
        let response = self.transmit(&cmd)?;
        let sw = response.status();

        if sw == status::FILE_NOT_FOUND {
            self.strict_warning("SELECT returned 6A82, unfused card?")?;
        }
        if sw == status::CARD_LOCKED {
            self.strict_warning("SELECT returned 6283, card is locked")?;
        }

        if sw == status::SUCCESS || sw == status::CARD_LOCKED {
            let detected = select::parse_fci_aid(response.data())?;
            debug!(aid = %detected, "selected security domain");
            if let Some(expected) = expected {
                if *expected != detected {
                    self.strict_warning(
                        "security domain AID in FCI does not match the requested AID",
                    )?;
                }
            }
            self.sd_aid = Some(match expected {
                Some(expected) => expected.clone(),
                None => detected,
            });
            return Ok(true);
        }

        Ok(false)
    }

    /// Open a secure channel with the default test keys, autonegotiated
    /// protocol and MAC protection
    pub fn open_secure_channel(&mut self) -> Result<()> {
        self.open_secure_channel_with(&KeySet::default(), None, SecurityLevel::MAC)
    }

    /// Open a secure channel: INITIALIZE UPDATE / EXTERNAL AUTHENTICATE
    /// mutual authentication followed by session key installation.
    ///
    /// `requested` of `None` autonegotiates SCP02_15 or SCP01_05 from the
    /// card's response. The static key set is only read; diversification
    /// is applied to an internal working copy.
    pub fn open_secure_channel_with(
        &mut self,
        static_keys: &KeySet,
        requested: Option<ScpVariant>,
        security_level: SecurityLevel,
    ) -> Result<()> {
        if let Some(variant) = requested {
            if variant.is_implicit() {
                return Err(Error::InvalidArgument(
                    "implicit secure channel variants cannot be opened explicitly",
                ));
            }
        }
        // Re-normalize in case the caller assembled raw bits
        let mut security_level = SecurityLevel::from_bits(security_level.bits())?;

        self.wrapper = None;

        let host_challenge = initialize_update::random_challenge();
        let cmd = initialize_update::with_challenge(
            static_keys.version(),
            static_keys.id(),
            &host_challenge,
        );
        let response = self.transmit(&cmd)?;
        let sw = response.status();

        if sw == status::SECURITY_CONDITION_NOT_SATISFIED
            || sw == status::AUTHENTICATION_METHOD_BLOCKED
        {
            return Err(Error::CardLocked);
        }
        if !sw.is_success() {
            return Err(Error::CardStatus(sw));
        }

        let init = InitUpdateResponse::parse(response.data())?;
        let session = Session::negotiate(static_keys, requested, host_challenge, &init)?;

        // Response MACs exist only in SCP02
        if session.variant().is_scp01() {
            security_level = security_level.without_rmac();
        }

        let host_cryptogram = session.host_cryptogram()?;
        let variant = session.variant();

        // EXTERNAL AUTHENTICATE itself runs at the MAC-only level
        let mut wrapper =
            SecureChannelWrapper::new(session.keys().clone(), variant, SecurityLevel::MAC)?;
        let auth_cmd = external_authenticate::with_cryptogram(security_level, &host_cryptogram);
        let wrapped = wrapper.wrap(&auth_cmd)?;

        trace!(command = %hex::encode(wrapped.to_bytes()), "transmitting");
        let raw = self.transport.transmit_raw(&wrapped.to_bytes())?;
        trace!(response = %hex::encode(&raw), "received");
        let auth_response = Response::from_bytes(&raw)?;
        if !auth_response.is_success() {
            return Err(Error::AuthenticationFailed("EXTERNAL AUTHENTICATE rejected"));
        }

        wrapper.set_security_level(security_level);
        if security_level.rmac() {
            wrapper.start_rmac();
        }

        debug!(%variant, level = %security_level, "secure channel established");
        self.wrapper = Some(wrapper);
        Ok(())
    }

    /// Delete an object by AID; `delete_related` removes its dependencies
    /// as well
    pub fn delete(&mut self, aid: &Aid, delete_related: bool) -> Result<()> {
        self.transmit(&delete::delete_object(aid, delete_related))?
            .into_success()
            .map(drop)
    }

    /// Load a CAP file: INSTALL [for load] followed by its LOAD blocks
    pub fn load_cap_file<F: LoadFile>(&mut self, cap: &F, params: &LoadParameters) -> Result<()> {
        let sd_aid = self.sd_aid.clone().ok_or(Error::NoSecurityDomain)?;

        let hash = if params.use_hash {
            cap.load_file_data_hash(params.include_debug)
        } else {
            Vec::new()
        };

        let load_params = if params.load_params {
            let code_length = cap.code_length(params.include_debug);
            vec![
                0xEF,
                0x04,
                0xC6,
                0x02,
                (code_length >> 8) as u8,
                code_length as u8,
            ]
        } else {
            Vec::new()
        };

        let cmd = install::for_load(cap.package_aid(), &sd_aid, &hash, &load_params);
        self.transmit(&cmd)?.into_success()?;

        let blocks = cap.load_blocks(
            params.include_debug,
            params.separate_components,
            params.block_size,
        );
        let count = blocks.len();
        for (i, block) in blocks.iter().enumerate() {
            let cmd = load::block(i == count - 1, i as u8, block);
            self.transmit(&cmd)?.into_success()?;
            trace!(block = i + 1, total = count, "load block sent");
        }

        Ok(())
    }

    /// Install an applet from a loaded package and make it selectable.
    ///
    /// The instance AID defaults to the applet AID and the parameters to
    /// an empty `C9` block, matching what most applets expect.
    pub fn install_and_make_selectable(
        &mut self,
        package: &Aid,
        applet: &Aid,
        instance: Option<&Aid>,
        privileges: u8,
        params: Option<&[u8]>,
        token: &[u8],
    ) -> Result<()> {
        let default_params = install::default_install_params();
        let params = params.unwrap_or(&default_params);
        let instance = instance.unwrap_or(applet);

        let cmd = install::for_install_and_make_selectable(
            package, applet, instance, privileges, params, token,
        );
        self.transmit(&cmd)?.into_success().map(drop)
    }

    /// Make an installed applet the default selected application
    pub fn make_default_selected(&mut self, aid: &Aid, privileges: u8) -> Result<()> {
        self.transmit(&install::make_default_selected(aid, privileges))?
            .into_success()
            .map(drop)
    }

    /// Walk every GET STATUS scope and collect the card's contents.
    ///
    /// Scopes the card rejects are skipped; the plain load file scope is
    /// skipped when the card already answered the scope with modules.
    pub fn get_status(&mut self) -> Result<AidRegistry> {
        let mut registry = AidRegistry::new();
        let mut have_modules = false;

        for p1 in [
            get_status_p1::ISSUER_SECURITY_DOMAIN,
            get_status_p1::APPLICATIONS,
            get_status_p1::EXEC_LOAD_FILES_AND_MODULES,
            get_status_p1::EXEC_LOAD_FILES,
        ] {
            if p1 == get_status_p1::EXEC_LOAD_FILES && have_modules {
                continue;
            }

            let Some(data) = self.get_status_scope(p1)? else {
                warn!(p1, "GET STATUS scope not supported");
                continue;
            };
            if p1 == get_status_p1::EXEC_LOAD_FILES_AND_MODULES {
                have_modules = true;
            }

            registry.extend(get_status::parse_entries(&data, p1)?);
        }

        Ok(registry)
    }

    /// Fetch one scope, following 6310 continuation; `None` when the card
    /// does not support the scope
    fn get_status_scope(&mut self, p1: u8) -> Result<Option<Vec<u8>>> {
        let mut response = self.transmit(&get_status::list(p1, false))?;
        if !response.is_success() && response.status() != status::MORE_DATA {
            return Ok(None);
        }

        let mut data = response.data().to_vec();
        while response.status() == status::MORE_DATA {
            response = self.transmit(&get_status::list(p1, true))?;
            if !response.is_success() && response.status() != status::MORE_DATA {
                return Err(Error::CardStatus(response.status()));
            }
            data.extend_from_slice(response.data());
        }

        Ok(Some(data))
    }

    /// GET DATA for an arbitrary tag
    pub fn get_data(&mut self, p1: u8, p2: u8) -> Result<Bytes> {
        let cmd = Command::new(cla::GP, ins::GET_DATA, p1, p2).with_le(0);
        self.transmit(&cmd)?.into_success()
    }

    /// The card production life cycle data (tag 9F7F)
    pub fn cplc(&mut self) -> Result<Bytes> {
        self.get_data(0x9F, 0x7F)
    }
}
